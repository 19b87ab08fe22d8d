//! MIG partitioner CLI
//!
//! A command-line tool for requesting partitioning plans, listing allowed
//! geometries and inspecting the MIG state of cluster nodes.

mod client;
mod commands;
mod config;
mod input;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{geometries, inspect, plan};
use std::path::PathBuf;

/// MIG partitioner CLI
#[derive(Parser)]
#[command(name = "migctl")]
#[command(author, version, about = "CLI for the MIG GPU partitioner", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via MIGCTL_API_URL env var)
    #[arg(long, env = "MIGCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format (defaults to the config file value, then table)
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Request a partitioning plan for pending pods
    Plan {
        /// Nodes file (JSON array or List)
        #[arg(long)]
        nodes: PathBuf,

        /// Pending pods to make room for (JSON array or List)
        #[arg(long)]
        pods: PathBuf,

        /// Pods already bound to nodes (JSON array or List)
        #[arg(long)]
        scheduled: Option<PathBuf>,

        /// Planning deadline in seconds (service default if omitted)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List the geometries allowed for a GPU model
    Geometries {
        /// GPU model, e.g. NVIDIA-A100-SXM4-40GB
        model: String,
    },

    /// Show used and free MIG slices per GPU, computed locally
    Inspect {
        /// Nodes file (JSON array or List)
        #[arg(long)]
        nodes: PathBuf,

        /// Pods already bound to nodes (JSON array or List)
        #[arg(long)]
        scheduled: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let format = cli
        .format
        .or_else(|| {
            config
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::from_name)
        })
        .unwrap_or_default();

    match cli.command {
        Commands::Plan {
            nodes,
            pods,
            scheduled,
            timeout,
        } => {
            let client = client::ApiClient::new(&config.api_url(cli.api_url))?;
            plan::run_plan(&client, &nodes, &pods, scheduled.as_deref(), timeout, format).await?;
        }
        Commands::Geometries { model } => {
            let client = client::ApiClient::new(&config.api_url(cli.api_url))?;
            geometries::list_geometries(&client, &model, format).await?;
        }
        Commands::Inspect { nodes, scheduled } => {
            inspect::inspect(&nodes, scheduled.as_deref(), format)?;
        }
    }

    Ok(())
}
