//! Replicate command implementation.
//!
//! Runs a full replication between two tree files in one process: the
//! target file is served by a receiver reached through the loopback client.

use canopy_publisher::{
    loopback_transport, ChangeEvent, Publisher, PublisherConfig, PublishReport, Release,
    RemoteConfig, ReplicationTarget,
};
use canopy_receiver::{ReceiverConfig, ReceiverServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::tree::{load_config, load_store, save_store};

/// Id of the single target the CLI replicates to.
pub const TARGET_ID: &str = "cli";

/// Stage the CLI marks its releases with.
const STAGE: &str = "public";

/// Base URL of the in-process receiver.
const LOOPBACK_URL: &str = "loopback://receiver/bin/receiver";

/// Options of the replicate command.
#[derive(Debug, Clone)]
pub struct ReplicateOptions {
    /// Source tree file.
    pub source: PathBuf,
    /// Receiver tree file.
    pub target: PathBuf,
    /// Release root.
    pub release: String,
    /// Changed paths.
    pub paths: Vec<String>,
    /// Publisher configuration file.
    pub config: Option<PathBuf>,
    /// Receiver configuration file.
    pub receiver_config: Option<PathBuf>,
}

/// Creates a publisher over `source` whose only target is a receiver over `live`.
pub fn loopback_publisher(
    source: Arc<canopy_store::MemoryStore>,
    live: Arc<canopy_store::MemoryStore>,
    config: PublisherConfig,
    receiver_config: ReceiverConfig,
    release_root: &str,
) -> Result<Publisher, Box<dyn std::error::Error>> {
    let server = Arc::new(ReceiverServer::new(receiver_config, live));
    let publisher = Publisher::new(config, source);
    let target = ReplicationTarget::remote(
        TARGET_ID,
        release_root,
        STAGE,
        RemoteConfig::new(LOOPBACK_URL),
    );
    publisher.add_target(target, Some(loopback_transport(server)))?;
    Ok(publisher)
}

/// Replicates and, if that succeeded, writes the receiver's store back.
pub fn replicate(options: &ReplicateOptions) -> Result<PublishReport, Box<dyn std::error::Error>> {
    let source = Arc::new(load_store(&options.source)?);
    let live = Arc::new(load_store(&options.target)?);
    let config: PublisherConfig = load_config(options.config.as_deref())?;
    let receiver_config: ReceiverConfig = load_config(options.receiver_config.as_deref())?;

    let publisher = loopback_publisher(
        Arc::clone(&source),
        Arc::clone(&live),
        config,
        receiver_config,
        &options.release,
    )?;

    let release = Release::current(source.as_ref(), &options.release)?.with_marks([STAGE]);
    let paths = if options.paths.is_empty() {
        vec![release.root.clone()]
    } else {
        options.paths.clone()
    };
    let event = ChangeEvent::new(release).with_updated(paths);

    let report = publisher.publish(&event);
    if report.is_success() {
        save_store(live.as_ref(), &options.target)?;
        info!(file = %options.target.display(), "receiver tree written");
    }
    Ok(report)
}

/// Runs the replicate command.
pub fn run(options: &ReplicateOptions) -> Result<(), Box<dyn std::error::Error>> {
    let report = replicate(options)?;
    println!("{}", serde_json::to_string_pretty(&report.digest())?);
    if let Some((target_id, err)) = report.failures().next() {
        return Err(format!("Replication to {target_id} failed: {err}").into());
    }
    Ok(())
}
