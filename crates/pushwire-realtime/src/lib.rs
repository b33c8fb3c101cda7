//! # pushwire-realtime
//!
//! Owns the lifecycle of one logical push connection. Provides:
//!
//! - A concurrency-safe [`ConnectionManager`] that collapses racing
//!   `connect()` calls into a single dial
//! - Bounded exponential-backoff reconnection
//! - Heartbeat probing with dead-connection detection
//! - Connected / disconnected / error listener registries
//! - A narrow [`Transport`] contract with WebSocket and in-memory implementations

pub mod connection;
pub mod events;
pub mod reconnect;
pub mod transport;

pub use connection::handle::{Connection, ConnectionId};
pub use connection::manager::ConnectionManager;
pub use connection::state::ConnectionState;
pub use connection::stats::{ConnectionStats, CounterSnapshot};
pub use events::registry::Subscription;
pub use events::{ConnectedEvent, DisconnectReason, DisconnectedEvent};
pub use reconnect::backoff::BackoffPolicy;
pub use transport::memory::{MemoryPeer, MemoryTransport, OpenOutcome};
pub use transport::websocket::WebSocketTransport;
pub use transport::{ReadyState, Transport, TransportEvent, TransportHandle, TransportLink};
