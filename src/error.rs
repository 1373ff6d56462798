//! Ingestion errors.

use std::io;
use std::path::PathBuf;

use mvd_store::StoreError;
use thiserror::Error;

/// Errors surfaced by [`crate::TaskIngestor`].
///
/// A stale or missing cache tag is not an error; it is reported through
/// [`crate::CacheLookup::Miss`] and handled by re-parsing. Losing a
/// promotion race is not an error either.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid input description: {0}")]
    InvalidInput(String),

    #[error("source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("unknown format {0:?}")]
    UnknownFormat(String),

    #[error("{format} parser failed: {message}")]
    Parse { format: String, message: String },

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidInput(msg) => IngestError::InvalidInput(msg),
            StoreError::SourceNotFound(path) => IngestError::SourceNotFound(path),
            other => IngestError::Store(other),
        }
    }
}

/// Result alias for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;
