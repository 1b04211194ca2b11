use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::conflict::ConflictPolicy;
use crate::domain::{ConflictAction, DocumentType};
use crate::error::CatalogError;
use crate::store::write_bytes_atomic;

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub schema_version: Option<u32>,
    /// How imports that hit an existing title or key are settled.
    #[serde(default)]
    pub import: ConflictPolicy,
    #[serde(default)]
    pub default_document_type: DocumentType,
    #[serde(default)]
    pub recent_files: Vec<Utf8PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: Some(1),
            import: ConflictPolicy::default(),
            default_document_type: DocumentType::default(),
            recent_files: Vec::new(),
        }
    }
}

const MAX_RECENT_FILES: usize = 10;

impl Settings {
    pub fn validate(&self) -> Result<(), CatalogError> {
        if !self.import.ask_user && self.import.default_action.is_none() {
            return Err(CatalogError::InvalidConflictPolicy);
        }
        Ok(())
    }

    /// Stop asking and always apply `action` from now on.
    pub fn remember(&mut self, action: ConflictAction) {
        self.import.ask_user = false;
        self.import.default_action = Some(action);
    }

    pub fn push_recent(&mut self, path: &Utf8Path) {
        self.recent_files.retain(|existing| existing != path);
        self.recent_files.insert(0, path.to_path_buf());
        self.recent_files.truncate(MAX_RECENT_FILES);
    }
}

pub struct SettingsLoader;

impl SettingsLoader {
    pub fn default_path() -> Result<Utf8PathBuf, CatalogError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.config_dir().join("ims-docstore").join(SETTINGS_FILE))
                    .ok()
            })
            .ok_or_else(|| CatalogError::Filesystem("unable to resolve config directory".to_string()))
    }

    /// Load settings from `path`, or from the user config directory. A file
    /// that does not exist yet yields defaults.
    pub fn resolve(path: Option<&str>) -> Result<(Utf8PathBuf, Settings), CatalogError> {
        let settings_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Self::default_path()?,
        };
        let settings = Self::load(&settings_path)?;
        Ok((settings_path, settings))
    }

    pub fn load(path: &Utf8Path) -> Result<Settings, CatalogError> {
        if !path.as_std_path().exists() {
            tracing::debug!(path = %path, "no settings file, using defaults");
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| CatalogError::ConfigRead(PathBuf::from(path.as_std_path())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Settings, CatalogError> {
        let settings: Settings = serde_json::from_str(content)
            .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(path: &Utf8Path, settings: &Settings) -> Result<(), CatalogError> {
        let content = serde_json::to_vec_pretty(settings)
            .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;
        write_bytes_atomic(path, &content)
    }
}
