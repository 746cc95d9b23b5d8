//! Connection registry and lifecycle tracking.
//!
//! # Responsibilities
//! - Own every accepted client connection (the active connection set)
//! - Assign each connection a readiness token / connection ID
//! - Enforce the configured connection cap
//! - Publish connection counts to other threads

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

/// Token reserved for the listening socket. Lowest, so it is serviced first.
pub const LISTENER: Token = Token(0);

const FIRST_CONNECTION: usize = 1;

/// Unique identifier for a connection, derived from its readiness token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(usize);

impl ConnectionId {
    pub fn token(&self) -> Token {
        Token(self.0)
    }
}

impl From<Token> for ConnectionId {
    fn from(token: Token) -> Self {
        Self(token.0)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why a connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Orderly zero-byte read.
    PeerShutdown,
    /// Unrecoverable read error.
    ReadError,
    /// Data did not fit in the ingestion buffer.
    BufferFull,
    /// The listener itself is closing.
    ListenerClosed,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::PeerShutdown => "peer_shutdown",
            CloseReason::ReadError => "read_error",
            CloseReason::BufferFull => "buffer_full",
            CloseReason::ListenerClosed => "listener_closed",
        }
    }
}

/// Tracks connection counts across threads.
///
/// The registry lives on the multiplexer thread; clones of the tracker let
/// the lifecycle and tests observe it.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    /// Current count of active connections.
    active_count: Arc<AtomicU64>,
    /// Connections admitted since start.
    accepted_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    fn track(&self, id: ConnectionId) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        self.accepted_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id,
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Get the number of connections admitted so far.
    pub fn accepted_count(&self) -> u64 {
        self.accepted_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection dropped");
    }
}

/// An accepted client connection. Dropping it closes the socket.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    bytes_received: u64,
    guard: ConnectionGuard,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.guard.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Total bytes ingested from this connection.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub(crate) fn record_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }
}

/// Error admitting a freshly accepted stream. The stream is closed either way.
#[derive(Debug, thiserror::Error)]
pub enum AdmitError {
    #[error("connection limit reached")]
    Full,
    #[error("failed to register connection: {0}")]
    Register(#[from] io::Error),
}

/// The active connection set.
///
/// The listening socket is a permanent member under [`LISTENER`]; every
/// other member was admitted from an accept and not yet released.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: BTreeMap<Token, Connection>,
    next_token: usize,
    max_connections: usize,
    tracker: ConnectionTracker,
}

impl ConnectionRegistry {
    /// Create an empty registry holding at most `max_connections` clients.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            next_token: FIRST_CONNECTION,
            max_connections,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Handle for observing counts from other threads.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Register an accepted stream for read readiness and start tracking it.
    pub fn admit(
        &mut self,
        registry: &Registry,
        mut stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<ConnectionId, AdmitError> {
        if self.connections.len() >= self.max_connections {
            return Err(AdmitError::Full);
        }

        let token = Token(self.next_token);
        registry.register(&mut stream, token, Interest::READABLE)?;
        self.next_token += 1;

        let id = ConnectionId::from(token);
        let connection = Connection {
            stream,
            peer_addr,
            bytes_received: 0,
            guard: self.tracker.track(id),
        };
        self.connections.insert(token, connection);
        Ok(id)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut Connection> {
        self.connections.get_mut(&token)
    }

    /// Deregister and remove a connection. The caller drops it to close it.
    pub fn release(&mut self, registry: &Registry, token: Token) -> Option<Connection> {
        let mut connection = self.connections.remove(&token)?;
        if let Err(e) = registry.deregister(&mut connection.stream) {
            tracing::debug!(
                connection_id = %connection.id(),
                error = %e,
                "Failed to deregister connection"
            );
        }
        Some(connection)
    }

    /// Deregister and close every connection. Returns how many were closed.
    pub fn release_all(&mut self, registry: &Registry) -> usize {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in &tokens {
            self.release(registry, *token);
        }
        tokens.len()
    }

    /// Whether `token` is in the active set. Always true for [`LISTENER`].
    pub fn contains(&self, token: Token) -> bool {
        token == LISTENER || self.connections.contains_key(&token)
    }

    /// Every monitored token in ascending order, listener first.
    pub fn tokens(&self) -> impl Iterator<Item = Token> + '_ {
        std::iter::once(LISTENER).chain(self.connections.keys().copied())
    }

    /// Number of client connections (the listener is not counted).
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}
