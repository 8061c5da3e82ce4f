//! Error types for the Warden node.

use thiserror::Error;

/// Result type for Warden node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Warden node operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown tenant - reported to the caller, not retried
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store I/O failure or timeout - the watcher skips the tenant and retries next tick
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// Override requested in a state that cannot accept it
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model validation error
    #[error(transparent)]
    Model(#[from] warden_core::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the watcher should simply retry on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientStore(_) | Error::Io(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::TransientStore(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::TransientStore("store call timed out".into())
    }
}
