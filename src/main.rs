// ABOUTME: CLI entry point for pg-replica-orchestrator
// ABOUTME: Parses commands and routes to appropriate handlers

use clap::{Parser, Subcommand};
use pg_replica_orchestrator::commands;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pg-replica-orchestrator")]
#[command(about = "Provision PostgreSQL logical replication from one primary to N replicas", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure the publication and every replica subscription, then wait for catch-up
    Ensure {
        /// Path to the cluster config (TOML)
        #[arg(long)]
        config: PathBuf,
        /// Print the final report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Show subscription progress on each replica and walsender stats on the primary
    Status {
        /// Path to the cluster config (TOML)
        #[arg(long)]
        config: PathBuf,
        /// Print the status snapshot as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Run an end-to-end replication check using a throwaway test table
    Smoke {
        /// Path to the cluster config (TOML)
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ensure { config, json } => commands::ensure(&config, json).await,
        Commands::Status { config, json } => commands::status(&config, json).await,
        Commands::Smoke { config } => commands::smoke(&config).await,
    }
}
