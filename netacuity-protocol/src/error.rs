//! Error types for the NetAcuity wire protocol

use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or parsing protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("malformed query: expected at least {expected} fields, got {actual}")]
    MalformedQuery { expected: usize, actual: usize },

    #[error("malformed query field '{field}': {value:?}")]
    MalformedField { field: &'static str, value: String },
}
