//! Transport contract the connection manager depends on.
//!
//! A transport dials an endpoint and hands back a [`TransportLink`]: a
//! handle for outbound traffic plus a stream of [`TransportEvent`]s. Any
//! implementation honouring this contract is interchangeable.

pub mod memory;
pub mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use pushwire_core::{AppError, AppResult};

/// Socket readiness as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// Dial or handshake still in progress.
    Connecting = 0,
    /// Open and able to carry traffic.
    Open = 1,
    /// Close initiated but not yet confirmed.
    Closing = 2,
    /// Closed.
    Closed = 3,
}

impl ReadyState {
    /// Decode a value previously stored with `as u8`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Events emitted by an open transport connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection finished opening.
    Opened,
    /// The connection is closed; no further events follow.
    Closed,
    /// The transport hit an error. It may or may not be followed by `Closed`.
    Errored(AppError),
    /// A pushed payload arrived.
    MessageReceived(Bytes),
    /// The peer acknowledged a liveness probe.
    Acknowledged,
}

/// Outbound side of an open transport connection.
#[async_trait]
pub trait TransportHandle: Send + Sync + std::fmt::Debug {
    /// Send an application payload.
    async fn send(&self, payload: Bytes) -> AppResult<()>;

    /// Send a liveness probe. The peer's answer arrives as
    /// [`TransportEvent::Acknowledged`].
    async fn probe(&self) -> AppResult<()>;

    /// Close the connection. Must be safe to call more than once.
    async fn close(&self);

    /// Current readiness.
    fn ready_state(&self) -> ReadyState;
}

/// A dialled connection: its handle plus its event stream.
#[derive(Debug)]
pub struct TransportLink {
    /// Outbound handle.
    pub handle: Arc<dyn TransportHandle>,
    /// Inbound events, ending after [`TransportEvent::Closed`].
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    /// Pair a handle with its event receiver.
    pub fn new(
        handle: Arc<dyn TransportHandle>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { handle, events }
    }
}

/// Dials endpoints.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to `endpoint`.
    async fn open(&self, endpoint: &str) -> AppResult<TransportLink>;
}
