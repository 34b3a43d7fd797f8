//! # Canopy Publisher
//!
//! Publishing side of Canopy content replication.
//!
//! This crate provides:
//! - Replication targets and their configuration
//! - A transport abstraction with an HTTP and a loopback implementation
//! - The protocol driver speaking to a receiver, one call per phase
//! - Remote and in-place replicators
//! - Per-target processes that accumulate changes and retry
//! - The publisher running all targets for a change event
//!
//! ## Architecture
//!
//! A change event names a release and the paths changed in it. The
//! [`Publisher`] hands the event to the [`ReplicationProcess`] of every target
//! whose stage is one of the release's marks. A process consolidates the paths
//! it collected and runs its replicator:
//!
//! 1. Start an update session at the common parent of the paths
//! 2. Ask the receiver which versions it has
//! 3. Upload the subtrees that differ, and the deleted ones
//! 4. Commit with the release's change number, deletions and child orderings
//!
//! ## Key Invariants
//!
//! - A failing target never stops the others
//! - Every session that is not committed is aborted
//! - A replication stops when the release changes under it
//! - Only failures the receiver advises to retry are retried

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod driver;
mod error;
mod http;
mod in_place;
mod process;
mod publisher;
mod release;
mod replicator;
mod target;
mod transport;

pub use config::{PublisherConfig, RetryConfig};
pub use driver::ReceiverFacade;
pub use error::{ReplicationError, ReplicationResult};
pub use http::{loopback_transport, HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use in_place::InPlaceReplicator;
pub use process::{ProcessState, ProcessStatus, ReplicationProcess};
pub use publisher::{OutcomeDigest, PublishReport, Publisher, TargetOutcome};
pub use release::{ChangeEvent, Release};
pub use replicator::{
    relevant_orderings, relevant_parent_nodes, CompareResult, RemoteReplicator, ReplicationStatus,
    ReplicationSummary, Replicator,
};
pub use target::{RemoteConfig, ReplicationKind, ReplicationTarget};
pub use transport::{MockTransport, ReceiverTransport};
