//! Reconnection: backoff computation and retry timer scheduling.

pub mod backoff;
pub mod scheduler;

pub use backoff::BackoffPolicy;
pub use scheduler::ReconnectScheduler;
