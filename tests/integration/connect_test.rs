//! Integration tests for connect, send, message fan-out and destroy.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;

use pushwire_core::ErrorKind;
use pushwire_realtime::{ConnectionState, DisconnectReason};

use helpers::{TestHarness, settle};

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_share_one_dial() {
    let harness = TestHarness::new();
    harness.transport.set_open_delay(Duration::from_millis(50));

    let calls = (0..8).map(|_| {
        let manager = harness.manager.clone();
        async move { manager.connect().await }
    });
    let results = join_all(calls).await;

    let first = results[0].as_ref().expect("connect succeeds").id();
    for result in &results {
        assert_eq!(result.as_ref().unwrap().id(), first);
    }
    assert_eq!(harness.transport.open_count(), 1);
    assert_eq!(harness.connected_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_returns_existing_connection() {
    let harness = TestHarness::new();

    let first = harness.manager.connect().await.unwrap();
    let second = harness.manager.connect().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(harness.transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_is_connected_follows_lifecycle() {
    let harness = TestHarness::new();
    assert!(!harness.manager.is_connected());
    assert_eq!(harness.manager.state(), ConnectionState::Disconnected);

    harness.manager.connect().await.unwrap();
    assert!(harness.manager.is_connected());
    assert_eq!(harness.manager.state(), ConnectionState::Connected);

    harness.peer().close_from_remote();
    assert!(!harness.manager.is_connected());

    settle().await;
    assert_eq!(harness.disconnected_count(), 1);
    assert_eq!(
        harness.disconnected.lock()[0].reason,
        DisconnectReason::ClosedByPeer
    );
    assert_eq!(harness.manager.state(), ConnectionState::Reconnecting);
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_surfaces_error() {
    let harness = TestHarness::new();
    harness.transport.reject_next(1, "maintenance");

    let err = harness.manager.connect().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Connection);
    assert!(err.message.contains("maintenance"));
    assert_eq!(harness.error_count(), 1);
    assert!(!harness.manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_dial_timeout() {
    let mut config = helpers::test_config();
    config.dial_timeout_ms = 100;
    config.auto_reconnect = false;
    let harness = TestHarness::with_config(config);
    harness.transport.set_open_delay(Duration::from_secs(5));

    let err = harness.manager.connect().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Connection);
    assert!(err.message.contains("timed out"));
    assert_eq!(harness.manager.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_send_and_receive() {
    let harness = TestHarness::new();
    let mut messages = harness.manager.messages();

    let err = harness.manager.send("too early").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotConnected);

    harness.manager.connect().await.unwrap();
    harness.manager.send("hello").await.unwrap();
    assert_eq!(harness.peer().sent(), vec![Bytes::from_static(b"hello")]);

    harness.peer().push_message("tick-1");
    harness.peer().push_message(Bytes::from_static(&[0xde, 0xad]));

    assert_eq!(messages.recv().await.unwrap(), Bytes::from_static(b"tick-1"));
    assert_eq!(messages.recv().await.unwrap(), Bytes::from_static(&[0xde, 0xad]));
    assert_eq!(harness.manager.stats().counters.messages_received, 2);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_without_close_keeps_connection() {
    let harness = TestHarness::new();
    let connection = harness.manager.connect().await.unwrap();

    harness.peer().emit_error("transient hiccup");
    settle().await;

    assert_eq!(harness.error_count(), 1);
    assert_eq!(harness.errors.lock()[0].kind, ErrorKind::Transport);
    assert_eq!(harness.disconnected_count(), 0);
    assert!(harness.manager.is_connected());
    assert_eq!(harness.manager.connect().await.unwrap().id(), connection.id());
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_disconnects_once() {
    let harness = TestHarness::new();
    harness.manager.connect().await.unwrap();

    harness.peer().fail("connection reset");
    settle().await;

    assert_eq!(harness.error_count(), 1);
    assert_eq!(harness.disconnected_count(), 1);
    assert_eq!(
        harness.disconnected.lock()[0].reason,
        DisconnectReason::TransportFailure
    );
}

#[tokio::test(start_paused = true)]
async fn test_destroy_before_connect_and_twice() {
    let harness = TestHarness::new();

    harness.manager.destroy().await;
    assert!(!harness.manager.is_connected());
    harness.manager.destroy().await;
    assert!(!harness.manager.is_connected());
    assert_eq!(harness.manager.state(), ConnectionState::Destroyed);

    let err = harness.manager.connect().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Destroyed);
    assert_eq!(harness.transport.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_closes_connection_silently() {
    let harness = TestHarness::new();
    harness.manager.connect().await.unwrap();
    let peer = harness.peer();

    harness.manager.destroy().await;
    settle().await;

    assert!(peer.is_closed());
    assert!(!harness.manager.is_connected());
    assert_eq!(harness.disconnected_count(), 0);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(harness.transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_during_inflight_dial() {
    let harness = TestHarness::new();
    harness.transport.set_open_delay(Duration::from_millis(500));

    let manager = harness.manager.clone();
    let pending = tokio::spawn(async move { manager.connect().await });
    settle().await;

    harness.manager.destroy().await;
    let result = pending.await.unwrap();

    assert_eq!(result.unwrap_err().kind, ErrorKind::Destroyed);
    assert!(harness.peer().is_closed());
    assert_eq!(harness.connected_count(), 0);
    assert!(!harness.manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_destroy_cancels_pending_retry() {
    let harness = TestHarness::new();
    harness.manager.connect().await.unwrap();

    harness.peer().close_from_remote();
    settle().await;
    assert_eq!(harness.manager.state(), ConnectionState::Reconnecting);

    harness.manager.destroy().await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(harness.transport.open_count(), 1);
    assert_eq!(harness.manager.state(), ConnectionState::Destroyed);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_removes_only_own_listener() {
    let harness = TestHarness::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&first);
    let first_sub = harness.manager.on_connected(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&second);
    let _second_sub = harness.manager.on_connected(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    first_sub.unsubscribe();
    first_sub.unsubscribe();
    assert!(!first_sub.is_active());

    harness.manager.connect().await.unwrap();
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(harness.connected_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_listener_is_isolated() {
    let harness = TestHarness::new();
    harness.manager.on_connected(|_| panic!("listener bug"));
    let reached = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reached);
    harness.manager.on_connected(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    harness.manager.connect().await.unwrap();

    assert_eq!(reached.load(Ordering::SeqCst), 1);
    assert!(harness.manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_stats_snapshot() {
    let harness = TestHarness::new();
    let stats = harness.manager.stats();
    assert!(!stats.connected);
    assert_eq!(stats.reconnect_attempts, 0);
    assert_eq!(stats.max_reconnect_attempts, 10);
    assert!(stats.auto_reconnect);
    assert!(stats.last_ack_time.is_none());

    let connection = harness.manager.connect().await.unwrap();
    let stats = harness.manager.stats();
    assert!(stats.connected);
    assert_eq!(stats.state, ConnectionState::Connected);
    assert_eq!(stats.connection_id, Some(connection.id()));
    assert!(stats.last_ack_time.is_some());
    assert_eq!(stats.counters.connections_opened, 1);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["state"], "connected");
    assert_eq!(json["endpoint"], helpers::ENDPOINT);
}
