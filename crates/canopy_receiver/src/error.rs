//! Error types for the publication receiver.

use canopy_protocol::{ProtocolError, RetryAdvice};
use canopy_store::StoreError;
use thiserror::Error;

use crate::session::SessionState;

/// Result type for receiver operations.
pub type ReceiverResult<T> = Result<T, ReceiverError>;

/// Errors that can occur in the publication receiver.
#[derive(Error, Debug)]
pub enum ReceiverError {
    /// The receiver is switched off.
    #[error("receiver is disabled")]
    Disabled,

    /// Malformed or incomplete request.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A path lies outside the area the session may touch.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// No staging area exists for the update id.
    #[error("unknown update: {0}")]
    UnknownUpdate(String),

    /// The release root changed since the session started.
    #[error(
        "release {release_root} changed since the update started: expected {expected:?}, found {found:?}"
    )]
    Conflict {
        /// Release root of the session.
        release_root: String,
        /// Change marker recorded at session start.
        expected: Option<String>,
        /// Change marker found now.
        found: Option<String>,
    },

    /// An uploaded archive could not be imported.
    #[error("import failed: {message}")]
    Import {
        /// What went wrong.
        message: String,
        /// Whether a retry can help.
        advice: RetryAdvice,
    },

    /// The session is not in a state that allows the operation.
    #[error("invalid session transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: SessionState,
        /// Requested state.
        to: SessionState,
    },

    /// A commit failed after it started changing live content.
    #[error("commit of {update_id} failed after applying changes, live content needs inspection: {source}")]
    PartialCommit {
        /// The session.
        update_id: String,
        /// The failure.
        #[source]
        source: Box<ReceiverError>,
    },

    /// Content store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ReceiverError {
    /// Advice for the sender, if any.
    pub fn retry_advice(&self) -> Option<RetryAdvice> {
        match self {
            ReceiverError::Conflict { .. } => Some(RetryAdvice::RetryImmediately),
            ReceiverError::Import { advice, .. } => Some(*advice),
            ReceiverError::Validation(_)
            | ReceiverError::ConstraintViolation(_)
            | ReceiverError::PartialCommit { .. }
            | ReceiverError::Store(_) => Some(RetryAdvice::NoAutomaticRetry),
            _ => None,
        }
    }

    /// HTTP-like status code for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            ReceiverError::Validation(_)
            | ReceiverError::ConstraintViolation(_)
            | ReceiverError::Protocol(_) => 400,
            ReceiverError::UnknownUpdate(_) => 404,
            ReceiverError::Conflict { .. } | ReceiverError::InvalidStateTransition { .. } => 409,
            ReceiverError::Disabled => 503,
            ReceiverError::Import { .. }
            | ReceiverError::PartialCommit { .. }
            | ReceiverError::Store(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ReceiverError::Validation("bad".into()).is_client_error());
        assert!(ReceiverError::UnknownUpdate("upd-x".into()).is_client_error());
        assert!(ReceiverError::Disabled.is_server_error());
        assert!(!ReceiverError::ConstraintViolation("outside".into()).is_server_error());
    }

    #[test]
    fn conflict_is_retryable() {
        let err = ReceiverError::Conflict {
            release_root: "/content/site".into(),
            expected: Some("c1".into()),
            found: Some("c2".into()),
        };
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.retry_advice(), Some(RetryAdvice::RetryImmediately));
        let msg = err.to_string();
        assert!(msg.contains("c1"));
        assert!(msg.contains("c2"));
    }

    #[test]
    fn partial_commit_keeps_source() {
        let err = ReceiverError::PartialCommit {
            update_id: "upd-abcdefghijkl".into(),
            source: Box::new(ReceiverError::Store(StoreError::not_found("/content/x"))),
        };
        assert_eq!(err.retry_advice(), Some(RetryAdvice::NoAutomaticRetry));
        assert!(err.to_string().contains("/content/x"));
    }
}
