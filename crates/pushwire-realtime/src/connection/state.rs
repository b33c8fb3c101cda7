//! Connection lifecycle states and the manager's guarded state.

use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use pushwire_core::AppResult;

use crate::reconnect::scheduler::ReconnectState;

use super::handle::{Connection, ConnectionId};
use super::heartbeat::HeartbeatState;

/// Lifecycle state of a managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and no retry pending.
    Disconnected,
    /// A dial is in flight.
    Connecting,
    /// A live connection exists.
    Connected,
    /// A retry timer is armed.
    Reconnecting,
    /// Torn down for good.
    Destroyed,
}

impl ConnectionState {
    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared result of the in-flight dial; every concurrent caller awaits a clone.
pub(crate) type PendingDial = Shared<BoxFuture<'static, AppResult<Arc<Connection>>>>;

/// The live connection plus the task draining its transport events.
pub(crate) struct LiveConnection {
    pub connection: Arc<Connection>,
    pub pump: JoinHandle<()>,
}

/// Everything the manager mutates. Guarded by one lock.
pub(crate) struct ManagerState {
    pub phase: ConnectionState,
    pub live: Option<LiveConnection>,
    pub in_flight: Option<PendingDial>,
    pub reconnect: ReconnectState,
    pub heartbeat: HeartbeatState,
}

impl ManagerState {
    pub fn new() -> Self {
        Self {
            phase: ConnectionState::Disconnected,
            live: None,
            in_flight: None,
            reconnect: ReconnectState::default(),
            heartbeat: HeartbeatState::default(),
        }
    }

    /// The live connection when its transport is still open.
    pub fn open_connection(&self) -> Option<&Arc<Connection>> {
        self.live
            .as_ref()
            .map(|live| &live.connection)
            .filter(|connection| connection.is_open())
    }

    /// Whether `conn_id` is the connection currently stored.
    pub fn is_current(&self, conn_id: ConnectionId) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| live.connection.id() == conn_id)
    }
}
