//! TCP ingestion daemon library.
//!
//! Accepts any number of TCP clients on one port and appends the bytes they
//! send, in arrival order, into a bounded shared buffer.

pub mod buffer;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use buffer::{BufferFull, SharedIngestionBuffer};
pub use config::schema::DaemonConfig;
pub use lifecycle::{LifecycleError, ListenerTask, ShutdownHandle};
pub use net::multiplexer::Multiplexer;
