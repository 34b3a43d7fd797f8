//! Canopy CLI
//!
//! Command-line tools for Canopy content replication.
//!
//! Content trees are JSON files holding a whole store, as written by
//! `serde_json` from a [`canopy_store::NodeTree`].
//!
//! # Commands
//!
//! - `consolidate` - Reduce paths to their minimal covering set
//! - `fingerprint` - Show the attribute fingerprint of a node
//! - `versions` - List the versionables below a path
//! - `replicate` - Replicate changed paths from one tree file into another
//! - `compare` - Compare two tree files below a path

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Canopy content replication tools.
#[derive(Parser)]
#[command(name = "canopy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reduce paths to their minimal covering set
    Consolidate {
        /// Paths to consolidate
        #[arg(required = true)]
        paths: Vec<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the attribute fingerprint of a node
    Fingerprint {
        /// Tree file
        #[arg(short, long)]
        tree: PathBuf,

        /// Node path
        node: String,

        /// Report the path relative to this offset
        #[arg(short, long)]
        offset: Option<String>,
    },

    /// List the versionables below a path
    Versions {
        /// Tree file
        #[arg(short, long)]
        tree: PathBuf,

        /// Root of the listing
        root: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replicate changed paths from one tree file into another
    Replicate {
        /// Source tree file
        #[arg(short, long)]
        source: PathBuf,

        /// Receiver tree file, rewritten after the run
        #[arg(short, long)]
        target: PathBuf,

        /// Release root
        #[arg(short, long)]
        release: String,

        /// Changed paths; the release root if none are given
        paths: Vec<String>,

        /// Publisher configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Receiver configuration file (JSON)
        #[arg(long)]
        receiver_config: Option<PathBuf>,
    },

    /// Compare a receiver tree file with a source tree file
    Compare {
        /// Source tree file
        #[arg(short, long)]
        source: PathBuf,

        /// Receiver tree file
        #[arg(short, long)]
        target: PathBuf,

        /// Release root
        #[arg(short, long)]
        release: String,

        /// Paths to compare; the release root if none are given
        paths: Vec<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Consolidate { paths, format } => {
            commands::consolidate::run(&paths, &format)?;
        }
        Commands::Fingerprint { tree, node, offset } => {
            commands::fingerprint::run(&tree, &node, offset.as_deref())?;
        }
        Commands::Versions { tree, root, format } => {
            commands::versions::run(&tree, &root, &format)?;
        }
        Commands::Replicate {
            source,
            target,
            release,
            paths,
            config,
            receiver_config,
        } => {
            let options = commands::replicate::ReplicateOptions {
                source,
                target,
                release,
                paths,
                config,
                receiver_config,
            };
            commands::replicate::run(&options)?;
        }
        Commands::Compare {
            source,
            target,
            release,
            paths,
        } => {
            commands::compare::run(&source, &target, &release, &paths)?;
        }
        Commands::Version => {
            println!("Canopy CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
