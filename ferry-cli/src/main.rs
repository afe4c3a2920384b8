//! Ferry CLI
//!
//! Command-line interface for submitting jobs to the Ferry gateway and
//! following them to completion.

mod api;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Ferry job pipeline CLI", long_about = None)]
struct Cli {
    /// Gateway URL
    #[arg(long, env = "FERRY_GATEWAY_URL", default_value = "http://localhost:8080")]
    gateway_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        gateway_url: cli.gateway_url,
    };

    handle_command(cli.command, &config).await
}
