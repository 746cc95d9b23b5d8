//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → Spawn multiplexer thread → ListenerTask
//!
//! Run (run below):
//!     Wait for either the thread to report back (fatal error)
//!     or a termination signal (signals.rs)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → ShutdownHandle wakes the loop → connections closed
//!     → thread joined → caller shuts down logging and exits
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config, logging, then the listener
//! - Listener failures are never retried; the process exits nonzero

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::ShutdownHandle;
pub use startup::{spawn_listener, LifecycleError, ListenerTask};

use crate::config::ListenerConfig;

/// Start the listener and block until it fails or a signal asks it to stop.
///
/// Returns `Ok(())` only for a signal-driven shutdown.
pub async fn run(config: &ListenerConfig) -> Result<(), LifecycleError> {
    let task = spawn_listener(config)?;
    let shutdown = task.shutdown_handle();

    let wait = task.wait();
    tokio::pin!(wait);

    tokio::select! {
        result = &mut wait => result,
        () = signals::shutdown_signal() => {
            shutdown.trigger();
            wait.await
        }
    }
}
