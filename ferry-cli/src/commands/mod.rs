//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;

use anyhow::Result;
use clap::Subcommand;
use ferry_core::domain::operation::Operation;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a job
    Submit {
        /// compile, run or analyse
        operation: Operation,

        /// JSON request body to send as-is
        #[arg(long, conflicts_with = "code")]
        file: Option<PathBuf>,

        /// Source code to wrap in a request body
        #[arg(long)]
        code: Option<String>,

        /// Language version sent with --code
        #[arg(long, requires = "code")]
        language_version: Option<String>,
    },
    /// Show a job's current status
    Status {
        operation: Operation,

        job_id: String,

        /// Metadata only, even for succeeded jobs
        #[arg(long)]
        no_output: bool,

        /// Include checkpoint diagnostics
        #[arg(long)]
        debug: bool,
    },
    /// Poll until a job is finished
    Wait {
        operation: Operation,

        job_id: String,

        /// Seconds between polls
        #[arg(long, default_value_t = 2)]
        interval: u64,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout: u64,
    },
}

/// Handle a CLI command
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    job::handle_job_command(command, config).await
}
