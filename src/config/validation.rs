//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes > 0, backlog fits `listen(2)`)
//! - Check the metrics address parses when metrics are enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DaemonConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::DaemonConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &DaemonConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let listener = &config.listener;

    if listener.buffer_size == 0 {
        errors.push(ValidationError::new("listener.buffer_size", "must be greater than 0"));
    }
    if listener.backlog == 0 {
        errors.push(ValidationError::new("listener.backlog", "must be greater than 0"));
    } else if i32::try_from(listener.backlog).is_err() {
        errors.push(ValidationError::new(
            "listener.backlog",
            format!("must not exceed {}", i32::MAX),
        ));
    }
    if listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    if listener.events_capacity == 0 {
        errors.push(ValidationError::new("listener.events_capacity", "must be greater than 0"));
    }

    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "metrics.address",
            format!("'{}' is not a socket address", config.metrics.address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
