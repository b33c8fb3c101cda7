//! Lifecycle events and the listener registries that fan them out.

pub mod dispatcher;
pub mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::handle::ConnectionId;

pub use dispatcher::EventDispatcher;
pub use registry::{ListenerRegistry, Subscription};

/// Delivered to connected listeners once a dial succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedEvent {
    /// The new connection.
    pub connection_id: ConnectionId,
    /// Endpoint it was dialled at.
    pub endpoint: String,
    /// When it was established.
    pub connected_at: DateTime<Utc>,
}

/// Why an established connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The transport reported a close.
    ClosedByPeer,
    /// The transport errored and is no longer open.
    TransportFailure,
    /// No liveness acknowledgement arrived in time.
    HeartbeatTimeout,
}

impl DisconnectReason {
    /// Stable string form, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClosedByPeer => "closed_by_peer",
            Self::TransportFailure => "transport_failure",
            Self::HeartbeatTimeout => "heartbeat_timeout",
        }
    }
}

/// Delivered to disconnected listeners when an established connection is lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectedEvent {
    /// The connection that was lost.
    pub connection_id: ConnectionId,
    /// Endpoint it was dialled at.
    pub endpoint: String,
    /// Cause.
    pub reason: DisconnectReason,
    /// When the loss was observed.
    pub disconnected_at: DateTime<Utc>,
}
