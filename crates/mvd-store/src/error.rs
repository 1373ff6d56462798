//! Errors from store operations.

use std::io;
use std::path::PathBuf;

use mvd_model::ModelError;
use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input description: {0}")]
    InvalidInput(String),

    #[error("source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("invalid digest: {0:?}")]
    InvalidDigest(String),
}

impl From<ModelError> for StoreError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidInput(msg) => StoreError::InvalidInput(msg),
            ModelError::Json(e) => StoreError::Json(e),
        }
    }
}
