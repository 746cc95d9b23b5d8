//! TCP listening socket.
//!
//! # Responsibilities
//! - Bind to the IPv4 wildcard address on the configured port
//! - Apply the configured backlog to `listen(2)`
//! - Hand a non-blocking socket to the readiness loop
//! - Graceful handling of accept errors (left to the caller)

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use mio::net::{TcpListener, TcpStream};
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::ListenerConfig;

/// Fatal listener-level errors. Any of these stops the multiplexer.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to create or configure the socket.
    #[error("Failed to open TCP socket: {0}")]
    Socket(#[source] io::Error),
    /// Failed to bind to address.
    #[error("Failed to bind to port {port}: {source}")]
    Bind { port: u16, source: io::Error },
    /// Failed to enter the listening state.
    #[error("Failed to listen with backlog {backlog}: {source}")]
    Listen { backlog: u32, source: io::Error },
    /// Failed to register a source with the readiness poller.
    #[error("Failed to register with the poller: {0}")]
    Register(#[source] io::Error),
    /// The readiness wait itself failed.
    #[error("Readiness wait failed: {0}")]
    Poll(#[source] io::Error),
}

/// A bound, listening, non-blocking TCP socket.
#[derive(Debug)]
pub struct Listener {
    /// The underlying listener, registered with the multiplexer's poller.
    inner: TcpListener,
    local_addr: SocketAddr,
    backlog: u32,
}

impl Listener {
    /// Bind to the configured port and start listening.
    pub fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port));

        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(ListenerError::Socket)?;
        socket
            .set_reuse_address(true)
            .map_err(ListenerError::Socket)?;
        socket.bind(&addr.into()).map_err(|source| ListenerError::Bind {
            port: config.port,
            source,
        })?;

        // validation caps the backlog at i32::MAX
        let backlog = i32::try_from(config.backlog).unwrap_or(i32::MAX);
        socket.listen(backlog).map_err(|source| ListenerError::Listen {
            backlog: config.backlog,
            source,
        })?;
        socket
            .set_nonblocking(true)
            .map_err(ListenerError::Socket)?;

        let inner = TcpListener::from_std(socket.into());
        let local_addr = inner.local_addr().map_err(ListenerError::Socket)?;

        tracing::info!(
            address = %local_addr,
            backlog = config.backlog,
            "TCP listener bound"
        );

        Ok(Self {
            inner,
            local_addr,
            backlog: config.backlog,
        })
    }

    /// Accept one pending connection.
    ///
    /// Returns `WouldBlock` once the pending queue is empty.
    pub fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.inner.accept()
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the configured pending-connection queue length.
    pub fn backlog(&self) -> u32 {
        self.backlog
    }

    pub(crate) fn source_mut(&mut self) -> &mut TcpListener {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ephemeral() -> ListenerConfig {
        ListenerConfig {
            port: 0,
            ..ListenerConfig::default()
        }
    }

    #[test]
    fn binds_ephemeral_port_on_wildcard() {
        let listener = Listener::bind(&ephemeral()).unwrap();
        let addr = listener.local_addr();

        assert!(addr.ip().is_unspecified());
        assert_ne!(addr.port(), 0);
        assert_eq!(listener.backlog(), 8);
    }

    #[test]
    fn port_in_use_is_bind_error() {
        let first = Listener::bind(&ephemeral()).unwrap();
        let taken = ListenerConfig {
            port: first.local_addr().port(),
            ..ListenerConfig::default()
        };

        match Listener::bind(&taken) {
            Err(ListenerError::Bind { port, .. }) => assert_eq!(port, taken.port),
            other => panic!("expected bind error, got {:?}", other),
        }
    }

    #[test]
    fn accept_without_pending_would_block() {
        let listener = Listener::bind(&ephemeral()).unwrap();
        let err = listener.accept().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn accepts_pending_connection() {
        let listener = Listener::bind(&ephemeral()).unwrap();
        let port = listener.local_addr().port();
        let client = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();

        // the handshake completes in the kernel; retry until it is queued
        let accepted = (0..100).find_map(|_| match listener.accept() {
            Ok(pair) => Some(pair),
            Err(_) => {
                std::thread::sleep(std::time::Duration::from_millis(10));
                None
            }
        });

        let (_stream, peer) = accepted.expect("connection never became acceptable");
        assert_eq!(peer, client.local_addr().unwrap());
    }
}
