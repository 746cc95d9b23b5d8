//! TCP ingestion daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!     TCP clients                ┌──────────────────────────────────────────┐
//!     ───────────────────────────┼─▶┌──────────┐    ┌──────────────────┐    │
//!     ───────────────────────────┼─▶│ listener │───▶│   multiplexer    │    │
//!     ───────────────────────────┼─▶└──────────┘    │ (readiness loop) │    │
//!                                │                  └────────┬─────────┘    │
//!                                │                           │ receive      │
//!                                │                           ▼              │
//!                                │                  ┌──────────────────┐    │
//!                                │                  │ shared ingestion │    │
//!                                │                  │      buffer      │    │
//!                                │                  └──────────────────┘    │
//!                                │                                          │
//!                                │  config · logging · metrics · lifecycle  │
//!                                └──────────────────────────────────────────┘
//! ```
//!
//! Exits 0 after a signal-driven shutdown and 1 when configuration, logging
//! or the listener fail.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use ingestd::config::{self, DaemonConfig};
use ingestd::lifecycle;
use ingestd::observability::logging::{init_logging, Severity};
use ingestd::observability::metrics::init_metrics;

#[derive(Parser)]
#[command(name = "ingestd")]
#[command(about = "Accept TCP clients and ingest their bytes into a shared buffer", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// TCP port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Pending-connection queue length
    #[arg(long)]
    backlog: Option<u32>,

    /// Ingestion buffer capacity in bytes
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Maximum simultaneously connected clients
    #[arg(long)]
    max_connections: Option<usize>,

    /// Directory for the log files (stderr when omitted)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Lowest severity logged: error, warning, info, debug or trace
    #[arg(long)]
    log_level: Option<Severity>,

    /// Expose Prometheus metrics on this address
    #[arg(long, value_name = "ADDR")]
    metrics_address: Option<SocketAddr>,
}

impl Cli {
    fn apply(self, config: &mut DaemonConfig) {
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(backlog) = self.backlog {
            config.listener.backlog = backlog;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.listener.buffer_size = buffer_size;
        }
        if let Some(max_connections) = self.max_connections {
            config.listener.max_connections = max_connections;
        }
        if let Some(directory) = self.log_dir {
            config.logging.directory = Some(directory);
        }
        if let Some(severity) = self.log_level {
            config.logging.severity = severity;
        }
        if let Some(address) = self.metrics_address {
            config.metrics.enabled = true;
            config.metrics.address = address.to_string();
        }
    }
}

fn resolve_config(cli: Cli) -> Result<DaemonConfig, config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => DaemonConfig::default(),
    };
    cli.apply(&mut config);
    config::validate_config(&config).map_err(config::ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ingestd: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_guard = match init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ingestd: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.listener.port,
        backlog = config.listener.backlog,
        buffer_size = config.listener.buffer_size,
        max_connections = config.listener.max_connections,
        "ingestd starting"
    );

    if config.metrics.enabled {
        match config.metrics.address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.metrics.address,
                "Failed to parse metrics address"
            ),
        }
    }

    let code = match lifecycle::run(&config.listener).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Listener failed");
            ExitCode::FAILURE
        }
    };

    log_guard.shutdown();
    code
}
