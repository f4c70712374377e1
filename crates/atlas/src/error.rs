//! Common error types for Atlas processes.

use thiserror::Error;

/// Process-level error for Atlas binaries.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Compute worker failure (task panicked or was torn down)
    #[error("worker error: {0}")]
    Worker(String),
}

/// Result type alias using Atlas Error.
pub type Result<T> = std::result::Result<T, Error>;
