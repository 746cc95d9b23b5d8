//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ingestd_connections_accepted_total` (counter)
//! - `ingestd_connections_rejected_total` (counter): closed at the connection cap
//! - `ingestd_connections_closed_total` (counter): by `reason`
//! - `ingestd_accept_errors_total` (counter)
//! - `ingestd_active_connections` (gauge)
//! - `ingestd_bytes_ingested_total` (counter)
//! - `ingestd_buffer_full_total` (counter)
//! - `ingestd_buffer_used_bytes` (gauge)
//!
//! Recording is a no-op until a recorder is installed, so the multiplexer
//! records unconditionally.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_accepted(active: usize) {
    counter!("ingestd_connections_accepted_total").increment(1);
    gauge!("ingestd_active_connections").set(active as f64);
}

pub fn record_rejected() {
    counter!("ingestd_connections_rejected_total").increment(1);
}

pub fn record_closed(reason: &'static str, count: u64, active: usize) {
    counter!("ingestd_connections_closed_total", "reason" => reason).increment(count);
    gauge!("ingestd_active_connections").set(active as f64);
}

pub fn record_accept_error() {
    counter!("ingestd_accept_errors_total").increment(1);
}

pub fn record_ingested(bytes: usize, buffered: usize) {
    counter!("ingestd_bytes_ingested_total").increment(bytes as u64);
    gauge!("ingestd_buffer_used_bytes").set(buffered as f64);
}

pub fn record_buffer_full() {
    counter!("ingestd_buffer_full_total").increment(1);
}
