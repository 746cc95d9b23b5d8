//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the listener before anything is spawned
//! - Start the multiplexer on its own named thread
//! - Report the loop's termination back to the async lifecycle
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Bind errors surface synchronously, before the thread exists
//! - The thread reports its result over a oneshot so the lifecycle can
//!   select on it alongside OS signals

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;

use crate::buffer::SharedIngestionBuffer;
use crate::config::ListenerConfig;
use crate::lifecycle::shutdown::ShutdownHandle;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::ListenerError;
use crate::net::multiplexer::Multiplexer;

const THREAD_NAME: &str = "ingestd-listener";

/// Errors that end the process.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The listener could not start or its loop failed.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// The listener thread could not be created.
    #[error("failed to spawn listener thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// The listener thread died without reporting a result.
    #[error("listener thread terminated abnormally")]
    Join,
}

/// A running listener and the handles needed to observe or stop it.
#[derive(Debug)]
pub struct ListenerTask {
    local_addr: SocketAddr,
    buffer: Arc<SharedIngestionBuffer>,
    tracker: ConnectionTracker,
    shutdown: ShutdownHandle,
    exited: oneshot::Receiver<Result<(), ListenerError>>,
    thread: JoinHandle<()>,
}

/// Bind the listener and start its loop on a dedicated thread.
pub fn spawn_listener(config: &ListenerConfig) -> Result<ListenerTask, LifecycleError> {
    let multiplexer = Multiplexer::bind(config)?;

    let local_addr = multiplexer.local_addr();
    let buffer = multiplexer.buffer();
    let tracker = multiplexer.tracker();
    let shutdown = multiplexer.shutdown_handle();

    let (exited_tx, exited) = oneshot::channel();
    let thread = thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || {
            let result = multiplexer.run();
            // nobody waiting means the lifecycle is already gone
            let _ = exited_tx.send(result);
        })
        .map_err(LifecycleError::Spawn)?;

    tracing::info!(address = %local_addr, thread = THREAD_NAME, "Listener started");

    Ok(ListenerTask {
        local_addr,
        buffer,
        tracker,
        shutdown,
        exited,
        thread,
    })
}

impl ListenerTask {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared handle to the ingestion buffer.
    pub fn buffer(&self) -> Arc<SharedIngestionBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Wait for the loop to terminate and reap its thread.
    ///
    /// `Ok(())` only after a requested shutdown.
    pub async fn wait(self) -> Result<(), LifecycleError> {
        let outcome = self.exited.await;

        let thread = self.thread;
        let joined = tokio::task::spawn_blocking(move || thread.join()).await;
        if !matches!(joined, Ok(Ok(()))) {
            return Err(LifecycleError::Join);
        }

        match outcome {
            Ok(result) => result.map_err(LifecycleError::from),
            Err(_) => Err(LifecycleError::Join),
        }
    }

    /// Trigger shutdown and wait for the loop to finish.
    pub async fn shutdown(self) -> Result<(), LifecycleError> {
        self.shutdown.trigger();
        self.wait().await
    }
}
