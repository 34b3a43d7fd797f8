//! # Canopy Testkit
//!
//! Test utilities for Canopy.
//!
//! This crate provides:
//! - Sample content trees and store helpers
//! - A store wrapper that simulates read failures
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use canopy_testkit::prelude::*;
//! use canopy_store::ContentStore;
//!
//! let store = sample_store();
//! assert!(store.exists(SITE_ROOT).unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
