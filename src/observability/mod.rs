//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, routed to the fixed log files)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log files or stderr
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Logging is the only administrative visibility unless metrics are enabled
//! - Metrics are cheap (no-op without an installed recorder)

pub mod logging;
pub mod metrics;
