//! Compare command implementation.

use canopy_publisher::{CompareResult, PublisherConfig};
use canopy_receiver::ReceiverConfig;
use std::path::Path;
use std::sync::Arc;

use super::replicate::{loopback_publisher, TARGET_ID};
use super::tree::load_store;

/// Compares the receiver tree with the source tree below `paths`.
pub fn compare(
    source: &Path,
    target: &Path,
    release: &str,
    paths: &[String],
) -> Result<CompareResult, Box<dyn std::error::Error>> {
    let source = Arc::new(load_store(source)?);
    let live = Arc::new(load_store(target)?);
    let publisher = loopback_publisher(
        source,
        live,
        PublisherConfig::default(),
        ReceiverConfig::default(),
        release,
    )?;
    Ok(publisher.compare_tree(TARGET_ID, paths)?)
}

/// Runs the compare command.
pub fn run(
    source: &Path,
    target: &Path,
    release: &str,
    paths: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let result = compare(source, target, release, paths)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.is_equal() {
        println!("Trees differ");
    }
    Ok(())
}
