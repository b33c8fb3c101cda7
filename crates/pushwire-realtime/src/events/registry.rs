//! Ordered listener registry with per-registration unsubscribe handles.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;
type Entries<E> = Mutex<Vec<(u64, Callback<E>)>>;

/// Ordered collection of callbacks for one event kind.
///
/// Notification runs over a snapshot taken at fire time, so callbacks may
/// subscribe or unsubscribe while being notified. A panicking callback is
/// logged and skipped; the rest still run.
pub struct ListenerRegistry<E> {
    kind: &'static str,
    entries: Arc<Entries<E>>,
    next_id: AtomicU64,
}

impl<E: 'static> fmt::Debug for ListenerRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("kind", &self.kind)
            .field("listeners", &self.len())
            .finish()
    }
}

impl<E: 'static> ListenerRegistry<E> {
    /// Create an empty registry; `kind` names it in logs.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append `callback`. The returned handle removes exactly this registration.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, Arc::new(callback)));

        let entries: Weak<Entries<E>> = Arc::downgrade(&self.entries);
        Subscription {
            id,
            kind: self.kind,
            detach: Mutex::new(Some(Box::new(move || {
                if let Some(entries) = entries.upgrade() {
                    entries.lock().retain(|(entry_id, _)| *entry_id != id);
                }
            }))),
        }
    }

    /// Invoke every registered callback with `event`, in registration order.
    ///
    /// Returns how many callbacks panicked.
    pub fn notify(&self, event: &E) -> usize {
        let snapshot: Vec<(u64, Callback<E>)> = self.entries.lock().clone();

        let mut failed = 0;
        for (id, callback) in snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                failed += 1;
                warn!(
                    kind = self.kind,
                    listener_id = id,
                    panic = panic_message(panic.as_ref()),
                    "Listener panicked; continuing with remaining listeners"
                );
            }
        }
        failed
    }

    /// Remove every registration.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Handle returned by a `subscribe` call.
///
/// Dropping it keeps the listener registered; call [`Subscription::unsubscribe`]
/// to remove it. Unsubscribing more than once is a no-op.
pub struct Subscription {
    id: u64,
    kind: &'static str,
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    /// Remove this registration. Later calls do nothing.
    pub fn unsubscribe(&self) {
        let detach = self.detach.lock().take();
        if let Some(detach) = detach {
            detach();
        }
    }

    /// Whether [`Subscription::unsubscribe`] has been called.
    pub fn is_active(&self) -> bool {
        self.detach.lock().is_some()
    }

    /// Registry-local id of this registration.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .finish()
    }
}
