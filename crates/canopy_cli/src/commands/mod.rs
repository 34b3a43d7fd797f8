//! CLI command implementations.

pub mod compare;
pub mod consolidate;
pub mod fingerprint;
pub mod replicate;
pub mod tree;
pub mod versions;
