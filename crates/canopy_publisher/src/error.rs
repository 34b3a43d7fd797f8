//! Error types for the publisher.

use canopy_protocol::{ProtocolError, RetryAdvice, Status, StatusLine};
use canopy_store::StoreError;
use thiserror::Error;

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors that can occur while replicating to a target.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// A receiver call failed: transport failure, error status or unreadable answer.
    #[error("{message}{}", status_suffix(.status_line.as_ref(), .status.as_ref()))]
    Remote {
        /// What was attempted.
        message: String,
        /// Underlying transport or decoding failure.
        cause: Option<String>,
        /// The decoded status, if the answer could be decoded.
        status: Option<Status>,
        /// The transport status line, if an answer arrived.
        status_line: Option<StatusLine>,
        /// Retry advice given by the receiver or derived from the failure.
        advice: Option<RetryAdvice>,
    },

    /// The transfer succeeded but the sent content was incomplete.
    #[error("{message} ({} suppressed errors)", suppressed.len())]
    Inconsistent {
        /// What was transferred.
        message: String,
        /// The errors met while packaging.
        suppressed: Vec<StoreError>,
    },

    /// The request or the target configuration is not acceptable.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The target id is not configured.
    #[error("unknown replication target: {0}")]
    UnknownTarget(String),

    /// The local release changed while replicating.
    #[error("release {release_root} changed from {expected} to {}", .found.as_deref().unwrap_or("<none>"))]
    SourceChanged {
        /// The release root.
        release_root: String,
        /// Change number the replication started from.
        expected: String,
        /// Change number found now.
        found: Option<String>,
    },

    /// Replication was aborted.
    #[error("replication cancelled")]
    Cancelled,

    /// Invalid process state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Local content could not be read or written.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A protocol message could not be built.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

fn status_suffix(line: Option<&StatusLine>, status: Option<&Status>) -> String {
    let mut suffix = String::new();
    if let Some(line) = line {
        suffix.push_str(&format!(" [{} {}]", line.code, line.reason));
    }
    if let Some(text) = status.map(Status::error_text).filter(|t| !t.is_empty()) {
        suffix.push_str(": ");
        suffix.push_str(&text);
    }
    suffix
}

impl ReplicationError {
    /// Creates a transport failure; the session may be restarted.
    pub fn transport(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            cause: Some(cause.into()),
            status: None,
            status_line: None,
            advice: Some(RetryAdvice::RetryImmediately),
        }
    }

    /// Creates an error for an answer that is not a valid success.
    ///
    /// The advice is taken from the decoded status.
    pub fn rejected(
        message: impl Into<String>,
        status: Option<Status>,
        status_line: Option<StatusLine>,
        cause: Option<String>,
    ) -> Self {
        let advice = status.as_ref().and_then(|s| s.retry_advice);
        Self::Remote {
            message: message.into(),
            cause,
            status,
            status_line,
            advice,
        }
    }

    /// Returns the retry advice carried by this error.
    pub fn retry_advice(&self) -> Option<RetryAdvice> {
        match self {
            ReplicationError::Remote { advice, .. } => *advice,
            ReplicationError::Inconsistent { .. }
            | ReplicationError::Validation(_)
            | ReplicationError::UnknownTarget(_) => Some(RetryAdvice::NoAutomaticRetry),
            _ => None,
        }
    }

    /// Returns true if restarting the replication from the beginning may succeed.
    pub fn is_retryable(&self) -> bool {
        self.retry_advice() == Some(RetryAdvice::RetryImmediately)
    }
}
