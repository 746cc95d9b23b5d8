//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use ingestd::config::ListenerConfig;
use tokio::net::TcpStream;

/// Listener settings on an ephemeral port.
pub fn listener_config(buffer_size: usize) -> ListenerConfig {
    ListenerConfig {
        buffer_size,
        port: 0,
        ..ListenerConfig::default()
    }
}

/// Connect to a listener bound on all interfaces.
pub async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap()
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Run `fut` with a five second timeout.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}
