//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use pushwire_core::config::ConnectionConfig;
use pushwire_core::error::AppError;
use pushwire_realtime::{
    ConnectedEvent, ConnectionManager, DisconnectedEvent, MemoryPeer, MemoryTransport,
};

/// Endpoint used by every test manager
pub const ENDPOINT: &str = "mem://push.test/stream";

/// Config with heartbeat off and the default 1000ms / 1.5x / 30000ms backoff
pub fn test_config() -> ConnectionConfig {
    let mut config = ConnectionConfig::new(ENDPOINT);
    config.heartbeat_enabled = false;
    config
}

/// Manager over an in-memory transport, with every lifecycle event recorded
pub struct TestHarness {
    /// Manager under test
    pub manager: ConnectionManager,
    /// Scripted transport shared with the manager
    pub transport: MemoryTransport,
    /// Recorded connected events
    pub connected: Arc<Mutex<Vec<ConnectedEvent>>>,
    /// Recorded disconnected events
    pub disconnected: Arc<Mutex<Vec<DisconnectedEvent>>>,
    /// Recorded errors
    pub errors: Arc<Mutex<Vec<AppError>>>,
}

impl TestHarness {
    /// Harness with [`test_config`]
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Harness with a custom config
    pub fn with_config(config: ConnectionConfig) -> Self {
        Self::with_transport(config, MemoryTransport::new())
    }

    /// Harness over a pre-configured transport
    pub fn with_transport(config: ConnectionConfig, transport: MemoryTransport) -> Self {
        let manager = ConnectionManager::new(config, Arc::new(transport.clone()))
            .expect("valid test config");

        let connected = Arc::new(Mutex::new(Vec::new()));
        let disconnected = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&connected);
        manager.on_connected(move |event: &ConnectedEvent| sink.lock().push(event.clone()));
        let sink = Arc::clone(&disconnected);
        manager.on_disconnected(move |event: &DisconnectedEvent| sink.lock().push(event.clone()));
        let sink = Arc::clone(&errors);
        manager.on_error(move |error: &AppError| sink.lock().push(error.clone()));

        Self {
            manager,
            transport,
            connected,
            disconnected,
            errors,
        }
    }

    /// Number of connected notifications so far
    pub fn connected_count(&self) -> usize {
        self.connected.lock().len()
    }

    /// Number of disconnected notifications so far
    pub fn disconnected_count(&self) -> usize {
        self.disconnected.lock().len()
    }

    /// Number of error notifications so far
    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    /// Remote side of the most recent connection
    pub fn peer(&self) -> MemoryPeer {
        self.transport.last_peer().expect("a connection was opened")
    }
}

/// Let spawned tasks drain pending transport events.
///
/// Meant for paused-clock tests: the clock only moves once every task is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Advance the paused clock by `ms` milliseconds.
pub async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
