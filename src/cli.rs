//! CLI definitions for Jobhive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Jobhive CLI.
#[derive(Parser)]
#[command(name = "jobhive")]
#[command(about = "In-process background job engine")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/jobhive.toml", global = true, env = "JOBHIVE_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the engine in the foreground until Ctrl-C (default)
    Run {
        /// JSON-lines file of jobs to enqueue at startup
        #[arg(long)]
        jobs: Option<PathBuf>,

        /// Directory whose files are served to file-processing jobs
        #[arg(long)]
        files: Option<PathBuf>,

        /// Seconds to wait for in-flight jobs on shutdown
        #[arg(long, default_value_t = 30)]
        drain_secs: u64,
    },

    /// Validate the configuration file and print the result
    CheckConfig,
}
