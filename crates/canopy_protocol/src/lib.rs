//! # Canopy Protocol
//!
//! Replication protocol types and the pure algorithms both sides share.
//!
//! This crate provides:
//! - [`consolidate`] for reducing changed paths to a covering set
//! - [`fingerprint`] for comparing node attributes across systems
//! - Versionable listings and their [`VersionableDiff`]
//! - [`UpdateId`] / [`UpdateInfo`] session identity
//! - JSON status [`Response`]s and their payloads
//! - [`Operation`] URLs and transport-neutral [`HttpRequest`]/[`HttpResponse`]
//!
//! This crate performs no network I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod consolidate;
mod error;
mod fingerprint;
mod http;
mod operation;
mod status;
mod update;
mod versionable;

pub use consolidate::{consolidate, consolidate_ordered};
pub use error::{ProtocolError, ProtocolResult};
pub use fingerprint::{
    digest_str, digest_stream, fingerprint, fingerprint_value, NodeFingerprint, BINARY_CHUNK_SIZE,
    MAX_LITERAL_LEN,
};
pub use http::{HttpRequest, HttpResponse, Method, StatusLine};
pub use operation::{Extension, Operation, OperationUrl};
pub use status::{
    Ack, CommitRequest, CompareParentsRequest, ContentState, Message, MessageLevel,
    ParentComparison, Payload, Response, RetryAdvice, Status,
};
pub use update::{ReleaseInfo, UpdateId, UpdateInfo, UPDATE_ID_PREFIX};
pub use versionable::{
    children_order, versionable_info, versionables_below, ChildrenOrderInfo, VersionableDiff,
    VersionableInfo,
};

/// Request parameter names.
pub mod params {
    /// Release root of the session or query.
    pub const RELEASE_ROOT: &str = "releaseRoot";
    /// Session id.
    pub const UPDATE_ID: &str = "updateId";
    /// Repeated content path.
    pub const PATH: &str = "path";
    /// Repeated path deleted on the sender.
    pub const DELETED_PATH: &str = "deletedpath";
    /// Change marker to record on commit.
    pub const RELEASE_CHANGE_ID: &str = "releaseChangeId";
}
