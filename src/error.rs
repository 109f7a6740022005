//! Error types for trainload

use thiserror::Error;

/// Errors that can occur during computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse stream payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Invalid stream: {0}")]
    InvalidStream(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid zone bins: {0}")]
    InvalidZoneBins(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
