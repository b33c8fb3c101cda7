//! Managed connection: lifecycle, handle, heartbeat, stats.

pub mod handle;
pub mod heartbeat;
pub mod manager;
pub mod state;
pub mod stats;

pub use handle::{Connection, ConnectionId};
pub use manager::ConnectionManager;
pub use state::ConnectionState;
