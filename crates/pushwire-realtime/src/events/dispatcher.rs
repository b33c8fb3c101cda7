//! Event dispatcher: one listener registry per lifecycle event kind.

use pushwire_core::AppError;

use super::registry::{ListenerRegistry, Subscription};
use super::{ConnectedEvent, DisconnectedEvent};

/// Fans lifecycle events out to connected, disconnected and error listeners.
#[derive(Debug)]
pub struct EventDispatcher {
    connected: ListenerRegistry<ConnectedEvent>,
    disconnected: ListenerRegistry<DisconnectedEvent>,
    errors: ListenerRegistry<AppError>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    /// Create a dispatcher with empty registries.
    pub fn new() -> Self {
        Self {
            connected: ListenerRegistry::new("connected"),
            disconnected: ListenerRegistry::new("disconnected"),
            errors: ListenerRegistry::new("error"),
        }
    }

    /// Register a connected listener.
    pub fn on_connected<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectedEvent) + Send + Sync + 'static,
    {
        self.connected.subscribe(callback)
    }

    /// Register a disconnected listener.
    pub fn on_disconnected<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DisconnectedEvent) + Send + Sync + 'static,
    {
        self.disconnected.subscribe(callback)
    }

    /// Register an error listener.
    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AppError) + Send + Sync + 'static,
    {
        self.errors.subscribe(callback)
    }

    pub(crate) fn notify_connected(&self, event: &ConnectedEvent) {
        self.connected.notify(event);
    }

    pub(crate) fn notify_disconnected(&self, event: &DisconnectedEvent) {
        self.disconnected.notify(event);
    }

    pub(crate) fn notify_error(&self, error: &AppError) {
        self.errors.notify(error);
    }

    /// Drop every listener of every kind.
    pub fn clear_all(&self) {
        self.connected.clear();
        self.disconnected.clear();
        self.errors.clear();
    }

    /// Total listeners across all kinds.
    pub fn listener_count(&self) -> usize {
        self.connected.len() + self.disconnected.len() + self.errors.len()
    }
}
