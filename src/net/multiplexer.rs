//! Connection multiplexer: the readiness-driven accept/ingest loop.
//!
//! # Responsibilities
//! - Own the listening socket, the connection registry and the buffer
//! - Block on one readiness wait for every monitored socket
//! - Accept new connections and dispatch ready ones to the receive path
//! - Close connections on peer shutdown or per-connection failure
//!
//! # Design Decisions
//! - One thread, non-blocking sockets: a silent peer never stalls the others
//! - Ready tokens are serviced in ascending order within one wake-up
//! - Only listener-level failures leave the loop; connection errors are logged

use std::collections::BTreeSet;
#[cfg(test)]
use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};

use crate::buffer::SharedIngestionBuffer;
use crate::config::ListenerConfig;
use crate::lifecycle::shutdown::ShutdownHandle;
use crate::net::connection::{
    AdmitError, CloseReason, ConnectionId, ConnectionRegistry, ConnectionTracker, LISTENER,
};
use crate::net::listener::{Listener, ListenerError};
use crate::net::receive::{receive, ReceiveError, Received, DEFAULT_READ_BUDGET};
use crate::observability::metrics;

/// Token of the shutdown waker. Highest, so it is handled after all sockets.
pub const WAKER: Token = Token(usize::MAX);

/// Wait before retrying a listener whose last accept failed.
const ACCEPT_RETRY: Duration = Duration::from_millis(50);

/// What the loop should do after one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// The listener context: everything the event loop owns.
pub struct Multiplexer {
    poll: Poll,
    events: Events,
    listener: Listener,
    connections: ConnectionRegistry,
    buffer: Arc<SharedIngestionBuffer>,
    /// Read chunk, `buffer_size` bytes.
    scratch: Box<[u8]>,
    /// Tokens to revisit without a new readiness edge: connections that
    /// yielded, and the listener after a failed accept.
    pending: BTreeSet<Token>,
    shutdown: ShutdownHandle,
    read_budget: usize,
    /// Errors returned by the next accepts instead of the socket's result.
    #[cfg(test)]
    accept_faults: VecDeque<io::Error>,
}

impl Multiplexer {
    /// Bind the listening socket and build the loop's state.
    ///
    /// Nothing is accepted until [`Multiplexer::run`] is called.
    pub fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let poll = Poll::new().map_err(ListenerError::Poll)?;

        tracing::info!(port = config.port, "Opening TCP listener");
        let mut listener = Listener::bind(config)?;
        poll.registry()
            .register(listener.source_mut(), LISTENER, Interest::READABLE)
            .map_err(ListenerError::Register)?;
        let shutdown = ShutdownHandle::new(poll.registry(), WAKER).map_err(ListenerError::Register)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(config.events_capacity),
            listener,
            connections: ConnectionRegistry::new(config.max_connections),
            buffer: Arc::new(SharedIngestionBuffer::new(config.buffer_size)),
            scratch: vec![0; config.buffer_size].into_boxed_slice(),
            pending: BTreeSet::new(),
            shutdown,
            read_budget: DEFAULT_READ_BUDGET,
            #[cfg(test)]
            accept_faults: VecDeque::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Shared handle to the ingestion buffer for consumers.
    pub fn buffer(&self) -> Arc<SharedIngestionBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.connections.tracker()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run until a fatal error or a triggered shutdown.
    ///
    /// Every connection and the listening socket are closed before returning.
    pub fn run(mut self) -> Result<(), ListenerError> {
        tracing::info!(address = %self.local_addr(), "TCP listener is accepting connections");

        let result = loop {
            match self.turn(None) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Shutdown) => break Ok(()),
                Err(e) => {
                    tracing::error!(error = %e, "Listener loop failed");
                    break Err(e);
                }
            }
        };

        self.close();
        result
    }

    /// One readiness wait plus servicing of everything it reported.
    fn turn(&mut self, timeout: Option<Duration>) -> Result<Flow, ListenerError> {
        // yielded connections are revisited without blocking; a listener
        // retrying a failed accept waits a little so EMFILE cannot spin
        let timeout = if self.pending.is_empty() {
            timeout
        } else if self.pending.iter().all(|token| *token == LISTENER) {
            Some(timeout.map_or(ACCEPT_RETRY, |t| t.min(ACCEPT_RETRY)))
        } else {
            Some(Duration::ZERO)
        };

        if let Err(e) = self.poll.poll(&mut self.events, timeout) {
            if e.kind() == ErrorKind::Interrupted {
                return Ok(Flow::Continue);
            }
            return Err(ListenerError::Poll(e));
        }

        let mut ready: Vec<Token> = self.events.iter().map(|event| event.token()).collect();
        ready.extend(std::mem::take(&mut self.pending));
        ready.sort_unstable();
        ready.dedup();

        for token in ready {
            match token {
                LISTENER => self.accept_pending(),
                WAKER => {
                    if self.shutdown.is_triggered() {
                        tracing::info!("Shutdown requested");
                        return Ok(Flow::Shutdown);
                    }
                }
                token => self.service(token),
            }
        }

        Ok(Flow::Continue)
    }

    /// Accept until the pending queue is empty. Failures are logged only.
    ///
    /// Readiness is edge-triggered, so an accept that fails before the queue
    /// is drained leaves the listener pending for a retry on a later turn.
    fn accept_pending(&mut self) {
        loop {
            match self.accept() {
                Ok((stream, peer_addr)) => self.admit(stream, peer_addr),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset
                    ) =>
                {
                    tracing::warn!(error = %e, "Transient accept error");
                    metrics::record_accept_error();
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection, will retry");
                    metrics::record_accept_error();
                    self.pending.insert(LISTENER);
                    break;
                }
            }
        }
    }

    fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        #[cfg(test)]
        {
            if let Some(fault) = self.accept_faults.pop_front() {
                return Err(fault);
            }
        }
        self.listener.accept()
    }

    fn admit(&mut self, stream: TcpStream, peer_addr: SocketAddr) {
        match self.connections.admit(self.poll.registry(), stream, peer_addr) {
            Ok(id) => {
                tracing::info!(
                    connection_id = %id,
                    peer_addr = %peer_addr,
                    active = self.connections.len(),
                    "Accepted connection"
                );
                metrics::record_accepted(self.connections.len());
            }
            Err(AdmitError::Full) => {
                tracing::warn!(
                    peer_addr = %peer_addr,
                    max_connections = self.connections.max_connections(),
                    "Connection limit reached, closing new connection"
                );
                metrics::record_rejected();
            }
            Err(AdmitError::Register(e)) => {
                tracing::error!(peer_addr = %peer_addr, error = %e, "Failed to register connection");
                metrics::record_rejected();
            }
        }
    }

    /// Hand a ready connection to the receive path and act on the outcome.
    fn service(&mut self, token: Token) {
        let Some(connection) = self.connections.get_mut(token) else {
            tracing::trace!(token = token.0, "Readiness for unknown token");
            return;
        };

        let outcome = receive(
            &self.buffer,
            connection.stream_mut(),
            &mut self.scratch,
            self.read_budget,
        );
        if let Ok(received) = &outcome {
            connection.record_received(received.bytes());
        }

        let id = ConnectionId::from(token);
        match outcome {
            Ok(Received::Drained { bytes }) => self.ingested(id, bytes),
            Ok(Received::Yielded { bytes }) => {
                self.ingested(id, bytes);
                self.pending.insert(token);
            }
            Ok(Received::Closed { bytes }) => {
                self.ingested(id, bytes);
                self.close_connection(token, CloseReason::PeerShutdown);
            }
            Err(ReceiveError::BufferFull(full)) => {
                tracing::error!(
                    connection_id = %id,
                    requested = full.requested,
                    available = full.available,
                    "Ingestion buffer full, dropping connection"
                );
                metrics::record_buffer_full();
                self.close_connection(token, CloseReason::BufferFull);
            }
            Err(ReceiveError::Read(e)) => {
                tracing::error!(connection_id = %id, error = %e, "Failed to receive from connection");
                self.close_connection(token, CloseReason::ReadError);
            }
        }
    }

    fn ingested(&self, id: ConnectionId, bytes: usize) {
        if bytes == 0 {
            return;
        }
        tracing::debug!(connection_id = %id, bytes, "Received data");
        metrics::record_ingested(bytes, self.buffer.len());
    }

    fn close_connection(&mut self, token: Token, reason: CloseReason) {
        self.pending.remove(&token);
        if let Some(connection) = self.connections.release(self.poll.registry(), token) {
            tracing::info!(
                connection_id = %connection.id(),
                peer_addr = %connection.peer_addr(),
                bytes_received = connection.bytes_received(),
                reason = reason.as_str(),
                "Closed connection"
            );
            drop(connection);
            metrics::record_closed(reason.as_str(), 1, self.connections.len());
        }
    }

    fn close(&mut self) {
        let closed = self.connections.release_all(self.poll.registry());
        self.pending.clear();
        metrics::record_closed(CloseReason::ListenerClosed.as_str(), closed as u64, 0);
        tracing::info!(
            address = %self.local_addr(),
            connections_closed = closed,
            "Closing TCP listener"
        );
    }
}
