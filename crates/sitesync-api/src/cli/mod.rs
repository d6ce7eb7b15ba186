//! CLI command definitions for the `sitesync` binary.
//!
//! Uses clap derive macros for argument parsing. Secrets and deployment
//! targets come from the environment, not from flags, so they never show
//! up in process listings.

pub mod deploy;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Rebuild and publish a static site whenever its repository changes.
#[derive(Parser)]
#[command(name = "sitesync", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Suppress all log output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "SITESYNC_JSON_LOGS")]
    pub json_logs: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Accept webhook and manual triggers on POST /sync.
    ///
    /// Deployments run in this process unless SITESYNC_WORKER_URL points at a
    /// separate worker.
    Serve {
        /// Port to listen on.
        #[arg(long, short, default_value = "4000", env = "SITESYNC_PORT")]
        port: u16,

        /// Host address to bind to.
        #[arg(long, default_value = "0.0.0.0", env = "SITESYNC_HOST")]
        host: String,
    },

    /// Run deployments forwarded by a trigger process (POST /worker/runs).
    Worker {
        /// Port to listen on.
        #[arg(long, short, default_value = "4001", env = "SITESYNC_WORKER_PORT")]
        port: u16,

        /// Host address to bind to.
        #[arg(long, default_value = "127.0.0.1", env = "SITESYNC_WORKER_HOST")]
        host: String,
    },

    /// Run one deployment in the foreground and exit.
    Deploy {
        /// Branch to deploy (defaults to SITESYNC_BRANCH).
        #[arg(long)]
        branch: Option<String>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
