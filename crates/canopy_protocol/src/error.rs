//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or interpreting protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An update id does not have the `upd-` + 12 alphanumerics form.
    #[error("invalid update id: {0:?}")]
    InvalidUpdateId(String),

    /// The URL does not name a known operation.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// The URL cannot be split into base, operation, extension and suffix.
    #[error("malformed operation url: {0}")]
    MalformedUrl(String),

    /// A required request parameter is missing.
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
