//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the logging subsystem from `LoggingConfig`
//! - Route events to the three fixed log files by level
//! - Flush and close the files on shutdown
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Severity is a config value, never process-wide mutable state
//! - Stderr with `RUST_LOG` override when no log directory is configured

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::{Level, Metadata};
use tracing_subscriber::{
    filter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::config::LoggingConfig;

/// Lowest severity written to the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    #[serde(alias = "warn")]
    Warning,
    Info,
    Debug,
    Trace,
}

impl Severity {
    /// The equivalent tracing level filter.
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Severity::Error => LevelFilter::ERROR,
            Severity::Warning => LevelFilter::WARN,
            Severity::Info => LevelFilter::INFO,
            Severity::Debug => LevelFilter::DEBUG,
            Severity::Trace => LevelFilter::TRACE,
        }
    }

    /// Directive understood by `EnvFilter`.
    pub fn directive(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warn",
            Severity::Info => "info",
            Severity::Debug => "debug",
            Severity::Trace => "trace",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directive())
    }
}

/// Unrecognised severity name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity '{0}' (expected error, warning, info, debug or trace)")]
pub struct UnknownSeverity(String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" | "warn" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            "debug" => Ok(Severity::Debug),
            "trace" => Ok(Severity::Trace),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

/// The fixed log files. Names are not configurable, only their directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Errors and warnings.
    Errors,
    /// Status and informational events.
    Status,
    /// Debug and trace events.
    Debug,
}

impl LogTarget {
    pub const ALL: [LogTarget; 3] = [LogTarget::Errors, LogTarget::Status, LogTarget::Debug];

    pub fn file_name(self) -> &'static str {
        match self {
            LogTarget::Errors => "ingestd-error.log",
            LogTarget::Status => "ingestd.log",
            LogTarget::Debug => "ingestd-debug.log",
        }
    }

    /// File an event of `level` is written to.
    pub fn for_level(level: &Level) -> Self {
        match *level {
            Level::ERROR | Level::WARN => LogTarget::Errors,
            Level::INFO => LogTarget::Status,
            _ => LogTarget::Debug,
        }
    }

    fn accepts(self, metadata: &Metadata<'_>) -> bool {
        Self::for_level(metadata.level()) == self
    }
}

/// Error type for logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path:?}: {source}")]
    Directory { path: PathBuf, source: io::Error },
    #[error("failed to open log file {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("failed to install log subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps the log files open; call [`LogGuard::shutdown`] before exiting.
#[derive(Debug)]
pub struct LogGuard {
    files: Vec<(LogTarget, Arc<File>)>,
}

impl LogGuard {
    /// Log the shutdown and flush every file to disk.
    pub fn shutdown(self) {
        tracing::info!("Shutting down log service");
        for (target, file) in &self.files {
            if let Err(e) = file.sync_all() {
                eprintln!("failed to flush {}: {}", target.file_name(), e);
            }
        }
    }
}

fn open_log_files(directory: &Path) -> Result<Vec<(LogTarget, Arc<File>)>, LoggingError> {
    fs::create_dir_all(directory).map_err(|source| LoggingError::Directory {
        path: directory.to_path_buf(),
        source,
    })?;

    LogTarget::ALL
        .iter()
        .map(|target| {
            let path = directory.join(target.file_name());
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map(|file| (*target, Arc::new(file)))
                .map_err(|source| LoggingError::Open { path, source })
        })
        .collect()
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard, LoggingError> {
    let guard = match &config.directory {
        Some(directory) => {
            let files = open_log_files(directory)?;
            let layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = files
                .iter()
                .map(|(target, file)| {
                    let target = *target;
                    tracing_fmt::layer()
                        .with_writer(Arc::clone(file))
                        .with_ansi(false)
                        .with_filter(filter::filter_fn(move |metadata: &Metadata<'_>| {
                            target.accepts(metadata)
                        }))
                        .boxed()
                })
                .collect();

            tracing_subscriber::registry()
                .with(layers)
                .with(config.severity.level_filter())
                .try_init()?;
            LogGuard { files }
        }
        None => {
            tracing_subscriber::registry()
                .with(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new(config.severity.directive())),
                )
                .with(tracing_fmt::layer().with_writer(io::stderr))
                .try_init()?;
            LogGuard { files: Vec::new() }
        }
    };

    tracing::info!(severity = %config.severity, "Initialized log service");
    Ok(guard)
}
