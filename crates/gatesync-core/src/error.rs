//! Error types for `GateSync` core library.

use thiserror::Error;

/// Result type alias using `GateSync` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `GateSync` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Wire record parsing error
    #[error("Malformed record: {0}")]
    Record(String),

    /// Record tag not part of the push protocol
    #[error("Unknown record tag: {0}")]
    UnknownTag(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
