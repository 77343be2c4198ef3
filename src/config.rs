//! Process configuration: built-in defaults, optional TOML file, environment
//! variables, then CLI flags — in that order of increasing precedence.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DOWNSTREAM_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;

/// MCP Hub: aggregates many downstream MCP servers behind one endpoint.
#[derive(Parser, Debug)]
#[command(name = "mcp-hub", version, about)]
pub struct Cli {
    /// Path to an optional TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bind address for the HTTP server.
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Timeout, in seconds, for each downstream MCP request.
    #[arg(long, env = "DOWNSTREAM_TIMEOUT_SECS")]
    pub downstream_timeout_secs: Option<u64>,

    /// Interval, in seconds, between automatic catalog refreshes.
    #[arg(long, env = "REFRESH_INTERVAL_SECS")]
    pub refresh_interval_secs: Option<u64>,

    /// Number of Actix worker threads (defaults to CPU count, capped at 16).
    #[arg(long, env = "WORKER_THREADS")]
    pub worker_threads: Option<usize>,

    /// Log verbosity, e.g. "info", "debug", "mcp_hub=trace". Overrides
    /// RUST_LOG when set.
    #[arg(short, long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Fields mirror the CLI flags 1:1; all optional, same defaults as the CLI.
#[derive(Deserialize, Default, Debug)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    downstream_timeout_secs: Option<u64>,
    refresh_interval_secs: Option<u64>,
    worker_threads: Option<usize>,
    log_level: Option<String>,
}

/// Fully resolved configuration used to wire up the process.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub downstream_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    pub worker_threads: usize,
    pub log_level: String,
}

impl Config {
    /// Resolves configuration from defaults, an optional file, and the
    /// parsed CLI/env overlay in `cli`. Returns an error only if an
    /// explicitly-named config file cannot be read or parsed.
    pub fn resolve(cli: &Cli) -> std::io::Result<Self> {
        let file = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text).map_err(|e| {
                    std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
                })?
            }
            None => FileConfig::default(),
        };

        let default_workers = num_cpus::get().min(16).max(1);

        Ok(Config {
            host: cli.host.clone().or(file.host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            downstream_timeout_secs: cli
                .downstream_timeout_secs
                .or(file.downstream_timeout_secs)
                .unwrap_or(DEFAULT_DOWNSTREAM_TIMEOUT_SECS),
            refresh_interval_secs: cli
                .refresh_interval_secs
                .or(file.refresh_interval_secs)
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS),
            worker_threads: cli.worker_threads.or(file.worker_threads).unwrap_or(default_workers),
            log_level: cli.log_level.clone().or(file.log_level).unwrap_or_else(|| "info".to_string()),
        })
    }
}
