//! Error types for rotorsense

use thiserror::Error;

/// Main error type for rotorsense
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Prototype store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Prototype store corrupt: {0}")]
    StoreCorrupt(String),

    #[error("Failed to persist model: {0}")]
    PersistFailed(String),

    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("Audio processing error: {0}")]
    Audio(String),

    #[error("Template bank error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

/// Result type for rotorsense operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::StoreCorrupt(err.to_string())
    }
}
