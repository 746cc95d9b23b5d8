//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the daemon.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::observability::logging::Severity;

/// Default capacity of the ingestion buffer, also the largest single read.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default length of the pending-connection queue.
pub const DEFAULT_BACKLOG: u32 = 8;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 7100;

/// Root configuration for the ingestion daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DaemonConfig {
    /// Listening socket and ingestion settings.
    pub listener: ListenerConfig,

    /// Log severity and destination.
    pub logging: LoggingConfig,

    /// Prometheus exporter settings.
    pub metrics: MetricsConfig,
}

/// Listener configuration.
///
/// Immutable once the listener starts; the multiplexer owns its copy for the
/// life of the loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Ingestion buffer capacity in bytes. Also bounds each socket read.
    pub buffer_size: usize,

    /// Pending-connection queue length passed to `listen(2)`.
    pub backlog: u32,

    /// Port bound on the IPv4 wildcard address. `0` picks an ephemeral port.
    pub port: u16,

    /// Maximum concurrently tracked client connections.
    pub max_connections: usize,

    /// Readiness events fetched per wake-up.
    pub events_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            backlog: DEFAULT_BACKLOG,
            port: DEFAULT_PORT,
            max_connections: 1024,
            events_capacity: 256,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Lowest severity written.
    pub severity: Severity,

    /// Directory for the log files. Logs go to stderr when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            severity: Severity::Info,
            directory: None,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Expose a Prometheus scrape endpoint.
    pub enabled: bool,

    /// Scrape endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9100".to_string(),
        }
    }
}
