//! # Canopy Store
//!
//! Content store abstraction for Canopy replication.
//!
//! Replication works on a hierarchical store: named nodes addressed by
//! absolute paths, typed attributes, ordered children and a versionable
//! marker. This crate defines that interface and ships the pieces the
//! protocol needs around it.
//!
//! ## Design Principles
//!
//! - The store is a capability passed explicitly to whoever needs it
//! - Must be `Send + Sync`; all operations take `&self`
//! - Protected attributes are decided by the store, never by callers
//! - Subtrees travel as [`Archive`]s that carry their ancestors' attributes
//!
//! ## Contents
//!
//! - [`ContentStore`] - The store trait
//! - [`MemoryStore`] - In-memory implementation for tests and tooling
//! - [`Archive`] - Packaging and import of subtrees
//! - [`path`] - Segment-aware path helpers
//! - [`attrs`] - Well-known attribute names
//!
//! ## Example
//!
//! ```rust
//! use canopy_store::{Archive, ContentStore, MemoryStore, Property};
//!
//! let source = MemoryStore::new();
//! source.ensure_node("/content/site/page").unwrap();
//! source.set_property("/content/site/page", "title", Property::string("Home")).unwrap();
//!
//! let bytes = Archive::package(&source, "/content/site/page").unwrap().to_bytes().unwrap();
//!
//! let target = MemoryStore::new();
//! let report = Archive::from_bytes(&bytes).unwrap().import_into(&target, "/staging");
//! assert!(!report.has_errors());
//! assert!(target.exists("/staging/content/site/page").unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;
pub mod attrs;
mod error;
mod memory;
mod node;
pub mod path;
mod store;
mod value;

pub use archive::{AncestorEntry, Archive, ImportReport};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use node::NodeTree;
pub use store::{ContentStore, PropertyEntry};
pub use value::{Binary, Property, PropertyType, Value};
