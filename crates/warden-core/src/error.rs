//! Error types for warden-core.

use thiserror::Error;

/// Result type for warden-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while constructing or mutating license records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The license record violates a model constraint.
    #[error("invalid license: {0}")]
    InvalidLicense(String),

    /// A tenant id that cannot address storage keys or topics unambiguously.
    #[error("invalid tenant id: {0}")]
    InvalidTenant(String),

    /// A member record violates a model constraint.
    #[error("invalid member: {0}")]
    InvalidMember(String),

    /// A topic string could not be parsed.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),
}
