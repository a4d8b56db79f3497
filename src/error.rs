use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BackupError {
    #[error("invalid dataset name: {0}")]
    InvalidDatasetName(String),

    #[error("cannot derive a dataset identifier from: {0:?}")]
    MissingIdentifier(String),

    #[error("invalid catalog endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("missing config file ckan-backup.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("unexpected catalog response: {0}")]
    CatalogResponse(String),

    #[error("resource filename contains no '.': {0}")]
    ResourceNaming(String),
}

impl BackupError {
    /// Distinguishes transport-class errors (connectivity, non-2xx replies,
    /// undecodable responses) from data-quality and setup errors, for log
    /// messages and exit-code mapping. Every failure is penalized alike.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BackupError::CatalogHttp(_)
                | BackupError::CatalogStatus { .. }
                | BackupError::CatalogResponse(_)
        )
    }
}
