//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bound, listening, non-blocking socket)
//!     → multiplexer.rs (readiness wait, accept, dispatch)
//!     → connection.rs (registry, per-connection tracking)
//!     → receive.rs (read until drained, enqueue into the shared buffer)
//!
//! Connection States:
//!     Accepted → Monitored → Closed (peer shutdown, read error, overflow)
//! ```
//!
//! # Design Decisions
//! - Single-threaded readiness loop, no thread per connection
//! - Connection cap enforced at accept time
//! - Every accepted connection is tracked for shutdown

pub mod connection;
pub mod listener;
pub mod multiplexer;
pub mod receive;
