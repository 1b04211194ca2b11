use std::fs;
use std::io::{BufReader, Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::document::Document;
use crate::error::CatalogError;
use crate::registry::DocumentRegistry;

pub const SESSION_SCHEMA_VERSION: u32 = 1;
pub const SESSION_EXTENSION: &str = "ims.json.gz";

#[derive(Debug, Deserialize)]
struct SessionFile {
    schema_version: u32,
    saved_at: DateTime<Utc>,
    #[serde(default)]
    current: Option<String>,
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Debug, Serialize)]
struct SessionFileRef<'a> {
    schema_version: u32,
    saved_at: DateTime<Utc>,
    current: Option<&'a str>,
    documents: Vec<&'a Document>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub path: String,
    pub saved_at: DateTime<Utc>,
    pub documents: usize,
    pub datasets: usize,
}

/// Saved sessions live under the user data directory unless a root is given.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: Utf8PathBuf,
}

impl SessionStore {
    pub fn new() -> Result<Self, CatalogError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join("ims-docstore").join("sessions"))
                    .ok()
            })
            .ok_or_else(|| {
                CatalogError::Filesystem("unable to resolve session directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn session_path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(format!("{name}.{SESSION_EXTENSION}"))
    }

    /// Sessions in the store root, sorted by path.
    pub fn list(&self) -> Result<Vec<Utf8PathBuf>, CatalogError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| CatalogError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            if path.as_str().ends_with(SESSION_EXTENSION) {
                sessions.push(path);
            }
        }
        sessions.sort();
        Ok(sessions)
    }

    /// Write every document to `path`. Paths ending in `.gz` are compressed.
    pub fn save(path: &Utf8Path, registry: &DocumentRegistry) -> Result<SessionSummary, CatalogError> {
        let saved_at = Utc::now();
        let file = SessionFileRef {
            schema_version: SESSION_SCHEMA_VERSION,
            saved_at,
            current: registry.current(),
            documents: registry.documents().collect(),
        };
        let json =
            serde_json::to_vec(&file).map_err(|err| CatalogError::SessionParse(err.to_string()))?;
        let content = if is_compressed(path) {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(&json)
                .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
            encoder
                .finish()
                .map_err(|err| CatalogError::Filesystem(err.to_string()))?
        } else {
            json
        };
        write_bytes_atomic(path, &content)?;

        let summary = SessionSummary {
            path: path.to_string(),
            saved_at,
            documents: registry.len(),
            datasets: registry.documents().map(|doc| doc.catalog.len()).sum(),
        };
        tracing::info!(path = %path, documents = summary.documents, "session saved");
        Ok(summary)
    }

    /// Load a session and rebuild its registry and tree.
    pub fn load(path: &Utf8Path) -> Result<DocumentRegistry, CatalogError> {
        let file = fs::File::open(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("{path}: {err}")))?;
        let reader: Box<dyn Read> = if is_compressed(path) {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        let session: SessionFile = serde_json::from_reader(reader)
            .map_err(|err| CatalogError::SessionParse(err.to_string()))?;
        if session.schema_version > SESSION_SCHEMA_VERSION {
            return Err(CatalogError::SessionParse(format!(
                "unsupported schema version {}",
                session.schema_version
            )));
        }
        let saved_at = session.saved_at;
        let registry = DocumentRegistry::from_documents(session.documents, session.current)?;
        tracing::info!(path = %path, %saved_at, documents = registry.len(), "session loaded");
        Ok(registry)
    }

    /// Like [`SessionStore::load`], but a missing file yields an empty registry.
    pub fn load_or_default(path: &Utf8Path) -> Result<DocumentRegistry, CatalogError> {
        if !path.as_std_path().exists() {
            return Ok(DocumentRegistry::new());
        }
        Self::load(path)
    }
}

fn is_compressed(path: &Utf8Path) -> bool {
    path.extension() == Some("gz")
}

/// Write through a temp file in the destination directory, then rename over
/// the target.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CatalogError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
        _ => Utf8PathBuf::from("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix("ims-docstore")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    Ok(())
}
