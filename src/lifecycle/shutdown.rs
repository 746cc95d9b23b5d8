//! Shutdown coordination for the listener.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::{Registry, Token, Waker};

/// Handle for stopping the multiplexer loop from another thread.
///
/// Wraps a poller waker: triggering sets a flag and wakes the readiness wait,
/// which then sees the flag and leaves the loop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Create a handle whose wake-ups arrive on `token`.
    pub fn new(registry: &Registry, token: Token) -> io::Result<Self> {
        Ok(Self {
            waker: Arc::new(Waker::new(registry, token)?),
            triggered: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Trigger the shutdown signal. Later calls are no-ops.
    pub fn trigger(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.waker.wake() {
            tracing::error!(error = %e, "Failed to wake listener for shutdown");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Events, Poll};
    use std::time::Duration;

    #[test]
    fn trigger_wakes_poller_once() {
        let mut poll = Poll::new().unwrap();
        let handle = ShutdownHandle::new(poll.registry(), Token(42)).unwrap();
        assert!(!handle.is_triggered());

        let remote = handle.clone();
        std::thread::spawn(move || remote.trigger()).join().unwrap();
        handle.trigger();
        assert!(handle.is_triggered());

        let mut events = Events::with_capacity(4);
        poll.poll(&mut events, Some(Duration::from_secs(2))).unwrap();
        let tokens: Vec<_> = events.iter().map(|e| e.token()).collect();
        assert_eq!(tokens, vec![Token(42)]);
    }
}
