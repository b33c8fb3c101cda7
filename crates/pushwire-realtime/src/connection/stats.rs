//! Point-in-time connection statistics and lifecycle counters.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::DisconnectReason;

use super::handle::ConnectionId;
use super::state::ConnectionState;

/// Snapshot returned by [`ConnectionManager::stats`](super::ConnectionManager::stats).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Managed endpoint.
    pub endpoint: String,
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Whether a live, open connection exists.
    pub connected: bool,
    /// Current live connection, if any.
    pub connection_id: Option<ConnectionId>,
    /// Consecutive automatic retries since the last successful connect.
    pub reconnect_attempts: u32,
    /// Retry limit.
    pub max_reconnect_attempts: u32,
    /// Whether automatic reconnection is enabled.
    pub auto_reconnect: bool,
    /// Delay used for the most recent retry, in milliseconds.
    pub current_delay_ms: u64,
    /// Last liveness acknowledgement on the live connection.
    pub last_ack_time: Option<DateTime<Utc>>,
    /// Last liveness probe sent on the live connection.
    pub last_probe_time: Option<DateTime<Utc>>,
    /// Lifetime counters.
    pub counters: CounterSnapshot,
}

/// Lifetime counters for one manager.
#[derive(Debug, Default)]
pub struct LifecycleCounters {
    /// Connections established
    pub connections_opened: AtomicU64,
    /// Established connections lost
    pub disconnects: AtomicU64,
    /// Dials that failed or timed out
    pub dial_failures: AtomicU64,
    /// Connections closed for missing heartbeat acks
    pub heartbeat_timeouts: AtomicU64,
    /// Payloads received
    pub messages_received: AtomicU64,
}

impl LifecycleCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an established connection
    pub fn record_connect(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lost connection
    pub fn record_disconnect(&self, reason: DisconnectReason) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        if reason == DisconnectReason::HeartbeatTimeout {
            self.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a failed dial
    pub fn record_dial_failure(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a received payload
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            heartbeat_timeouts: self.heartbeat_timeouts.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
        }
    }
}

/// Serializable counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Connections established
    pub connections_opened: u64,
    /// Established connections lost
    pub disconnects: u64,
    /// Dials that failed or timed out
    pub dial_failures: u64,
    /// Connections closed for missing heartbeat acks
    pub heartbeat_timeouts: u64,
    /// Payloads received
    pub messages_received: u64,
}
