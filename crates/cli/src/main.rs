//! scalerctl
//!
//! Operator tool for the log-derived autoscaler: inspect persisted scaling
//! history, query live replica and loop status, and replay log dumps offline.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{history, replay, status};
use std::path::PathBuf;
use std::time::Duration;

/// Log-derived autoscaler CLI
#[derive(Parser)]
#[command(name = "scalerctl")]
#[command(author, version, about = "CLI for the log-derived autoscaler", long_about = None)]
pub struct Cli {
    /// Scaling gateway URL (can also be set via SCALER_CONTROL_PLANE_URL env var)
    #[arg(long, env = "SCALER_CONTROL_PLANE_URL")]
    pub control_plane: Option<String>,

    /// Agent API URL (can also be set via SCALER_AGENT_URL env var)
    #[arg(long, env = "SCALER_AGENT_URL")]
    pub agent_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the persisted scaling history of an app
    History {
        /// Control-plane app name the history is stored under
        app: String,

        /// History directory
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Show only the newest N entries
        #[arg(long)]
        last: Option<usize>,
    },

    /// Show replica counts reported by the scaling gateway
    Status,

    /// Show the agent's control loops
    Loops,

    /// Replay a log dump through reconstruction and aggregation
    Replay {
        /// JSON file: `[{timestamp_nanos, text}]` or a Loki query_range response
        file: PathBuf,

        /// Service the lines belong to
        #[arg(long)]
        service: String,

        /// Window length in seconds
        #[arg(long, default_value = "600")]
        window_secs: u64,

        /// CPU utilization to attach to the window (0.0 - 1.0)
        #[arg(long)]
        cpu: Option<f64>,

        /// Current replica count, for building the policy observation
        #[arg(long)]
        replicas: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    match cli.command {
        Commands::History { app, dir, last } => {
            let dir = config.history_dir(dir);
            if cli.verbose {
                output::print_info(&format!("Reading history from {}", dir.display()));
            }
            history::show_history(&dir, &app, last, cli.format).await?;
        }
        Commands::Status => {
            let url = config.control_plane_url(cli.control_plane);
            if cli.verbose {
                output::print_info(&format!("Querying {}", url));
            }
            let client = client::ApiClient::new(&url)?;
            status::show_scale_status(&client, cli.format).await?;
        }
        Commands::Loops => {
            let url = config.agent_url(cli.agent_url);
            if cli.verbose {
                output::print_info(&format!("Querying {}", url));
            }
            let client = client::ApiClient::new(&url)?;
            status::show_loops(&client, cli.format).await?;
        }
        Commands::Replay {
            file,
            service,
            window_secs,
            cpu,
            replicas,
        } => {
            if window_secs == 0 {
                anyhow::bail!("--window-secs must be positive");
            }
            replay::run_replay(
                &file,
                &service,
                Duration::from_secs(window_secs),
                cpu,
                replicas,
                cli.format,
            )
            .await?;
        }
    }

    Ok(())
}
