//! Error types for document construction.

use thiserror::Error;

/// Errors raised while building or decoding model documents.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The value cannot be represented as a JSON input description.
    #[error("invalid input description: {0}")]
    InvalidInput(String),

    /// A stored document could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
