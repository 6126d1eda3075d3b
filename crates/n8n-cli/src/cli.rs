use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "n8n-manager",
    about = "Version and lifecycle manager for an n8n container",
    version = env!("CARGO_PKG_VERSION"),
    author = "n8n Manager Team",
    long_about = "Inspect, back up, upgrade and roll back the n8n container while keeping its ports, volumes, environment and network."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress log output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format (json, table, plain)
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Show container state, version, health and resource usage
    Status,

    /// List release versions available in the registry
    Versions {
        /// Maximum number of versions
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List locally cached n8n images, newest first
    Images,

    /// Check whether upgrading to a version looks safe
    Check {
        /// Target version
        version: String,
    },

    /// Archive the data volume into the backup directory
    Backup,

    /// Back up, then recreate the container on another version
    Upgrade {
        /// Target version
        version: String,

        /// Skip the backup taken before upgrading
        #[arg(long)]
        no_backup: bool,
    },

    /// Recreate the container on the previous local image
    Rollback,

    /// Start the container
    Start,

    /// Stop the container
    Stop,

    /// Restart the container
    Restart,

    /// Restore the container after an interrupted upgrade
    Recover {
        /// Remove a lock left behind by a crashed upgrade first
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
    Plain,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Table => "table",
            OutputFormat::Plain => "plain",
        }
    }
}
