//! End-to-end ingestion through a running listener.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use ingestd::config::ListenerConfig;
use ingestd::lifecycle::spawn_listener;

mod common;

#[tokio::test]
async fn bytes_from_one_client_arrive_in_order() {
    let task = spawn_listener(&common::listener_config(64)).unwrap();
    let buffer = task.buffer();

    let mut client = common::connect(task.local_addr()).await;
    client.write_all(b"hello ").await.unwrap();
    client.write_all(b"world").await.unwrap();

    assert!(common::wait_until(|| buffer.len() == 11).await);
    assert_eq!(buffer.drain(64), b"hello world");

    task.shutdown().await.unwrap();
}

#[tokio::test]
async fn idle_client_does_not_stall_active_one() {
    let task = spawn_listener(&common::listener_config(64)).unwrap();
    let buffer = task.buffer();
    let tracker = task.tracker();

    let _idle = common::connect(task.local_addr()).await;
    let mut active = common::connect(task.local_addr()).await;
    assert!(common::wait_until(|| tracker.active_count() == 2).await);

    active.write_all(b"ping").await.unwrap();
    assert!(common::wait_until(|| buffer.len() == 4).await);
    assert_eq!(buffer.drain(64), b"ping");

    task.shutdown().await.unwrap();
}

#[tokio::test]
async fn closed_client_is_removed() {
    let task = spawn_listener(&common::listener_config(64)).unwrap();
    let buffer = task.buffer();
    let tracker = task.tracker();

    let mut client = common::connect(task.local_addr()).await;
    client.write_all(b"bye").await.unwrap();
    drop(client);

    assert!(common::wait_until(|| tracker.active_count() == 0 && buffer.len() == 3).await);
    assert_eq!(tracker.accepted_count(), 1);
    assert_eq!(buffer.drain(64), b"bye");

    task.shutdown().await.unwrap();
}

#[tokio::test]
async fn overflow_closes_sender_and_keeps_a_prefix() {
    let task = spawn_listener(&common::listener_config(8)).unwrap();
    let buffer = task.buffer();
    let tracker = task.tracker();

    let mut client = common::connect(task.local_addr()).await;
    // may fail once the listener has already dropped us
    let _ = client.write_all(b"abcdefghijkl").await;

    assert!(common::wait_until(|| tracker.accepted_count() == 1 && tracker.active_count() == 0).await);

    let contents = buffer.drain(64);
    assert!(contents.len() <= 8);
    assert!(b"abcdefghijkl".starts_with(&contents));

    task.shutdown().await.unwrap();
}

#[tokio::test]
async fn clients_over_the_cap_are_disconnected() {
    let config = ListenerConfig {
        max_connections: 1,
        ..common::listener_config(64)
    };
    let task = spawn_listener(&config).unwrap();
    let buffer = task.buffer();

    let mut first = common::connect(task.local_addr()).await;
    first.write_all(b"a").await.unwrap();
    assert!(common::wait_until(|| buffer.len() == 1).await);

    let mut second = common::connect(task.local_addr()).await;
    let mut byte = [0u8; 1];
    let read = common::within(second.read(&mut byte)).await;
    assert!(matches!(read, Ok(0) | Err(_)));

    first.write_all(b"b").await.unwrap();
    assert!(common::wait_until(|| buffer.len() == 2).await);
    assert_eq!(buffer.drain(64), b"ab");

    task.shutdown().await.unwrap();
}
