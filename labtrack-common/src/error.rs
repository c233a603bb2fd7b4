//! Common error types for LabTrack

use thiserror::Error;

/// Common result type for LabTrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across LabTrack crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted store could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
