//! Error types for content store operations.

use std::io;
use thiserror::Error;

use crate::value::PropertyType;

/// Result type for content store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing content.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The node at the given path does not exist.
    #[error("node not found: {path}")]
    NotFound {
        /// The path that was looked up.
        path: String,
    },

    /// A node already exists where a new one should be placed.
    #[error("node already exists: {path}")]
    AlreadyExists {
        /// The occupied path.
        path: String,
    },

    /// The path is not an absolute, well-formed content path.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },

    /// Attempted to write an attribute the store manages itself.
    #[error("attribute {name} of {path} is protected")]
    Protected {
        /// The node path.
        path: String,
        /// The attribute name.
        name: String,
    },

    /// Values of a multi-valued attribute do not share one type.
    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        /// The declared element type.
        expected: PropertyType,
        /// The type that was actually supplied.
        found: PropertyType,
    },

    /// The store cannot be read at the moment.
    #[error("content not accessible at {path}: {reason}")]
    Unavailable {
        /// The path whose content could not be accessed.
        path: String,
        /// Description of the failure.
        reason: String,
    },

    /// Archive or tree (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred, e.g. while streaming a binary.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Creates a [`StoreError::NotFound`] for the given path.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates a [`StoreError::InvalidPath`].
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
