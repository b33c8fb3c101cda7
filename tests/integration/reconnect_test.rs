//! Integration tests for automatic reconnection and attempt limits.

mod helpers;

use pushwire_realtime::{ConnectionState, OpenOutcome};

use helpers::{TestHarness, advance_ms, settle, test_config};

#[tokio::test(start_paused = true)]
async fn test_retry_delays_grow_geometrically() {
    let harness = TestHarness::new();
    harness
        .transport
        .set_fallback(OpenOutcome::Reject("down".to_string()));

    assert!(harness.manager.connect().await.is_err());

    let mut delays = vec![harness.manager.stats().current_delay_ms];
    for _ in 0..4 {
        let wait = *delays.last().unwrap();
        advance_ms(wait + 1).await;
        delays.push(harness.manager.stats().current_delay_ms);
    }

    assert_eq!(delays, vec![1000, 1500, 2250, 3375, 5063]);
    assert_eq!(harness.transport.open_count(), 5);
    assert_eq!(harness.manager.stats().reconnect_attempts, 5);
}

#[tokio::test(start_paused = true)]
async fn test_retry_delay_is_capped() {
    let mut config = test_config();
    config.max_reconnect_attempts = 20;
    config.reconnect.max_delay_ms = 4000;
    let harness = TestHarness::with_config(config);
    harness
        .transport
        .set_fallback(OpenOutcome::Reject("down".to_string()));

    assert!(harness.manager.connect().await.is_err());
    for _ in 0..6 {
        let wait = harness.manager.stats().current_delay_ms;
        advance_ms(wait + 1).await;
    }

    assert_eq!(harness.manager.stats().current_delay_ms, 4000);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let mut config = test_config();
    config.max_reconnect_attempts = 3;
    let harness = TestHarness::with_config(config);
    harness
        .transport
        .set_fallback(OpenOutcome::Reject("down".to_string()));

    assert!(harness.manager.connect().await.is_err());
    advance_ms(60_000).await;

    // One manual dial plus three automatic retries.
    assert_eq!(harness.transport.open_count(), 4);
    let stats = harness.manager.stats();
    assert_eq!(stats.reconnect_attempts, 3);
    assert_eq!(stats.state, ConnectionState::Disconnected);
    assert!(!stats.connected);

    advance_ms(600_000).await;
    assert_eq!(harness.transport.open_count(), 4);

    harness.transport.set_fallback(OpenOutcome::Accept);
    harness.manager.connect().await.unwrap();
    assert_eq!(harness.manager.stats().reconnect_attempts, 0);
    assert!(harness.manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_restarts_counting() {
    let mut config = test_config();
    config.max_reconnect_attempts = 2;
    let harness = TestHarness::with_config(config);
    harness
        .transport
        .set_fallback(OpenOutcome::Reject("down".to_string()));

    assert!(harness.manager.connect().await.is_err());
    advance_ms(60_000).await;
    assert_eq!(harness.manager.stats().reconnect_attempts, 2);

    assert!(harness.manager.connect().await.is_err());
    let stats = harness.manager.stats();
    assert_eq!(stats.reconnect_attempts, 1);
    assert_eq!(stats.current_delay_ms, 1000);
    assert_eq!(stats.state, ConnectionState::Reconnecting);
}

#[tokio::test(start_paused = true)]
async fn test_close_triggers_single_disconnect_and_reconnect() {
    let harness = TestHarness::new();
    let first = harness.manager.connect().await.unwrap();

    harness.peer().close_from_remote();
    settle().await;

    assert_eq!(harness.disconnected_count(), 1);
    assert_eq!(harness.disconnected.lock()[0].connection_id, first.id());
    assert_eq!(harness.manager.stats().reconnect_attempts, 1);
    assert_eq!(harness.connected_count(), 1);

    advance_ms(1000).await;
    settle().await;

    assert_eq!(harness.connected_count(), 2);
    assert_eq!(harness.disconnected_count(), 1);
    assert_eq!(harness.transport.open_count(), 2);

    let stats = harness.manager.stats();
    assert!(stats.connected);
    assert_eq!(stats.reconnect_attempts, 0);
    assert_ne!(stats.connection_id, Some(first.id()));
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_after_failures() {
    let harness = TestHarness::new();
    harness.transport.reject_next(3, "warming up");

    assert!(harness.manager.connect().await.is_err());
    // 1000 + 1500 + 2250
    advance_ms(4751).await;

    assert!(harness.manager.is_connected());
    assert_eq!(harness.transport.open_count(), 4);
    assert_eq!(harness.error_count(), 3);
    assert_eq!(harness.connected_count(), 1);
    assert_eq!(harness.manager.stats().reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_when_auto_reconnect_disabled() {
    let mut config = test_config();
    config.auto_reconnect = false;
    let harness = TestHarness::with_config(config);
    harness.manager.connect().await.unwrap();

    harness.peer().close_from_remote();
    settle().await;
    advance_ms(60_000).await;

    assert_eq!(harness.disconnected_count(), 1);
    assert_eq!(harness.transport.open_count(), 1);
    assert_eq!(harness.manager.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_while_reconnecting() {
    let harness = TestHarness::new();
    harness.manager.connect().await.unwrap();
    harness.peer().close_from_remote();
    settle().await;
    assert_eq!(harness.manager.state(), ConnectionState::Reconnecting);

    harness.manager.connect().await.unwrap();
    advance_ms(5_000).await;

    assert_eq!(harness.transport.open_count(), 2);
    assert_eq!(harness.connected_count(), 2);
    assert_eq!(harness.manager.stats().reconnect_attempts, 0);
}
