//! Listener startup and shutdown.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use ingestd::config::ListenerConfig;
use ingestd::lifecycle::{spawn_listener, LifecycleError};
use ingestd::net::listener::ListenerError;

mod common;

#[tokio::test]
async fn shutdown_closes_clients_and_returns_ok() {
    let task = spawn_listener(&common::listener_config(64)).unwrap();
    let buffer = task.buffer();
    let tracker = task.tracker();

    let mut client = common::connect(task.local_addr()).await;
    client.write_all(b"data").await.unwrap();
    assert!(common::wait_until(|| buffer.len() == 4).await);

    common::within(task.shutdown()).await.unwrap();
    assert_eq!(tracker.active_count(), 0);

    let mut byte = [0u8; 1];
    let read = common::within(client.read(&mut byte)).await;
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn shutdown_handle_can_be_triggered_repeatedly() {
    let task = spawn_listener(&common::listener_config(16)).unwrap();
    let handle = task.shutdown_handle();

    handle.trigger();
    handle.trigger();
    assert!(handle.is_triggered());
    common::within(task.wait()).await.unwrap();
}

#[tokio::test]
async fn port_in_use_fails_startup() {
    let occupied = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let config = ListenerConfig {
        port: occupied.local_addr().unwrap().port(),
        ..ListenerConfig::default()
    };

    match spawn_listener(&config) {
        Err(LifecycleError::Listener(ListenerError::Bind { port, .. })) => {
            assert_eq!(port, config.port);
        }
        other => panic!("expected bind failure, got {:?}", other.map(|t| t.local_addr())),
    }
}
