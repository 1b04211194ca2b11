use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::DatasetCatalog;
use crate::domain::{DocumentId, DocumentType};

/// One experiment: a title, acquisition parameters and every dataset derived
/// from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(skip)]
    id: DocumentId,
    pub title: String,
    #[serde(default)]
    pub document_type: DocumentType,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub catalog: DatasetCatalog,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Raw file the document was loaded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl Document {
    pub fn new(title: impl Into<String>, document_type: DocumentType) -> Self {
        Self {
            id: DocumentId::next(),
            title: title.into(),
            document_type,
            parameters: BTreeMap::new(),
            catalog: DatasetCatalog::new(),
            created_at: Utc::now(),
            path: None,
            notes: String::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Independent copy under a new title. Every payload and the document
    /// itself get fresh identities.
    pub fn deep_copy(&self, title: impl Into<String>) -> Self {
        Self {
            id: DocumentId::next(),
            title: title.into(),
            document_type: self.document_type,
            parameters: self.parameters.clone(),
            catalog: self.catalog.deep_copy(),
            created_at: Utc::now(),
            path: self.path.clone(),
            notes: self.notes.clone(),
        }
    }
}
