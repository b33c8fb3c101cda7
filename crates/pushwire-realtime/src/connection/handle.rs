//! Handle to the single live transport connection.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pushwire_core::AppResult;

use crate::transport::{ReadyState, TransportHandle};

/// Unique connection identifier
pub type ConnectionId = Uuid;

/// A live connection owned by a [`ConnectionManager`](super::ConnectionManager).
///
/// Callers may send through it and inspect it; closing stays with the manager.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    endpoint: String,
    connected_at: DateTime<Utc>,
    transport: Arc<dyn TransportHandle>,
}

impl Connection {
    pub(crate) fn new(endpoint: String, transport: Arc<dyn TransportHandle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint,
            connected_at: Utc::now(),
            transport,
        }
    }

    /// Connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Endpoint this connection was dialled at
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// When the dial completed
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Transport readiness
    pub fn ready_state(&self) -> ReadyState {
        self.transport.ready_state()
    }

    /// Whether the transport reports the connection open
    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Send a payload over this connection
    pub async fn send(&self, payload: impl Into<Bytes>) -> AppResult<()> {
        self.transport.send(payload.into()).await
    }

    pub(crate) async fn probe(&self) -> AppResult<()> {
        self.transport.probe().await
    }

    pub(crate) async fn close(&self) {
        self.transport.close().await;
    }
}
