//! # Canopy Receiver
//!
//! Receiving side of Canopy content replication.
//!
//! This crate provides:
//! - Update sessions with per-session staging areas
//! - Commit of staged content into live content, with deletions, orphan
//!   removal and child orderings
//! - An optimistic concurrency guard on the release root's change marker
//! - Content state, release info and parent comparison queries
//! - A request handler and server facade speaking the JSON status protocol
//!
//! # Architecture
//!
//! The receiver keeps no content of its own. Live content and staging areas
//! both live in the [`canopy_store::ContentStore`] passed in; each session's
//! bookkeeping is stored as attributes of its staging node, so a session
//! survives as long as its staging area does.
//!
//! # Sessions
//!
//! 1. `startupdate` allocates `<tmpDir>/<updateId>` and records the release
//!    root's change marker
//! 2. `pathupload` imports archives into the staging area
//! 3. `commitupdate` moves staged content live and stamps the new marker,
//!    or `abortupdate` discards the staging area

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Library code reports failures as error statuses instead of panicking.
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod apply;
mod config;
mod error;
mod handler;
mod receiver;
mod server;
mod session;

pub use config::{ReceiverConfig, DEFAULT_TMP_DIR};
pub use error::{ReceiverError, ReceiverResult};
pub use handler::RequestHandler;
pub use receiver::PublicationReceiver;
pub use server::ReceiverServer;
pub use session::{
    SessionState, StagingRecord, CONTENT_PATH_ATTR, ORIGINAL_MARKER_ATTR, RELEASE_ROOT_ATTR,
    UPDATED_PATHS_ATTR,
};
