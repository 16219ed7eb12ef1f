//! LineKV - A Minimal In-Memory Key-Value Server
//!
//! This is the main entry point for the LineKV server.
//! It parses the command line, sets up logging, binds the listener and
//! runs the server until Ctrl+C.

use clap::Parser;
use linekv::{CliArgs, Config, Server};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Set up logging; RUST_LOG overrides --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = Config::from(&args);
    info!(version = linekv::VERSION, "Starting LineKV");

    let server = Server::new(config)?;

    // A bind failure aborts before any connection is accepted
    let listener = server.bind().await?;

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    server.run(listener, shutdown).await?;
    Ok(())
}
