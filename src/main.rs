//! MCP Hub entry point: parses configuration, initializes structured
//! logging, and runs the HTTP server until shutdown.

mod config;
mod core;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Config};
use crate::core::server::run_server_http;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(&cli)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    run_server_http(config).await
}
