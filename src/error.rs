use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::Kind;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("{kind} slot mismatch: {detail}")]
    KindMismatch { kind: Kind, detail: String },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("key already present: {0}")]
    KeyConflict(String),

    #[error("a document titled `{0}` already exists")]
    #[diagnostic(help("rename or delete the existing document first"))]
    DuplicateTitle(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("source dataset has no annotations: {0}")]
    EmptySource(String),

    #[error("conflict policy has no default action and asking the user is disabled")]
    #[diagnostic(help("set `default_action` in settings.json or enable `ask_user`"))]
    InvalidConflictPolicy,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to parse session: {0}")]
    SessionParse(String),

    #[error("failed to parse data file: {0}")]
    Parse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl CatalogError {
    pub(crate) fn kind_mismatch(kind: Kind, detail: impl Into<String>) -> Self {
        CatalogError::KindMismatch {
            kind,
            detail: detail.into(),
        }
    }
}
