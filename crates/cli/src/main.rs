//! Load-aware scheduler CLI
//!
//! Submits pods for scheduling decisions, manages reservations and inspects
//! the scheduler's tracked assignments and health.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{cluster, scheduling};
use std::path::PathBuf;

/// Load-aware scheduler CLI
#[derive(Parser)]
#[command(name = "lasctl")]
#[command(author, version, about = "CLI for the Load-Aware Scheduler", long_about = None)]
pub struct Cli {
    /// Scheduler API URL (can also be set via LASCTL_API_URL env var)
    #[arg(long, env = "LASCTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a pod against every node and show the ranking
    Schedule {
        /// Pod definition (JSON)
        pod: PathBuf,
    },

    /// Reserve a node for a pod
    Reserve {
        /// Pod definition (JSON)
        pod: PathBuf,

        /// Node to reserve
        #[arg(long)]
        node: String,
    },

    /// Release a reservation
    Unreserve {
        /// Pod definition (JSON)
        pod: PathBuf,

        /// Node holding the reservation
        #[arg(long)]
        node: String,
    },

    /// Show pods assigned to a node since its last telemetry report
    Assignments {
        /// Node name
        node: String,
    },

    /// Show scheduler health and readiness
    Health,
}

async fn run(cli: Cli) -> Result<()> {
    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Schedule { pod } => scheduling::schedule(&client, &pod, cli.format).await,
        Commands::Reserve { pod, node } => {
            scheduling::reserve(&client, &pod, &node, cli.format).await
        }
        Commands::Unreserve { pod, node } => {
            scheduling::unreserve(&client, &pod, &node, cli.format).await
        }
        Commands::Assignments { node } => cluster::assignments(&client, &node, cli.format).await,
        Commands::Health => cluster::health(&client, cli.format).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run(Cli::parse()).await {
        output::print_error(&format!("{:#}", err));
        std::process::exit(1);
    }
}
