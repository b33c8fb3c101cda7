//! Reconnect scheduler: attempt accounting and the single pending retry timer.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::backoff::BackoffPolicy;

/// Retry bookkeeping owned by the manager state.
#[derive(Debug, Default)]
pub struct ReconnectState {
    /// Consecutive automatic retries since the last successful connect.
    pub attempts: u32,
    /// Delay used for the most recent retry.
    pub current_delay: Duration,
    timer: Option<PendingTimer>,
}

impl ReconnectState {
    /// Whether a retry timer is currently armed.
    pub fn has_pending_timer(&self) -> bool {
        self.timer.is_some()
    }
}

#[derive(Debug)]
struct PendingTimer {
    token: u64,
    handle: JoinHandle<()>,
}

/// Decides whether and when to retry, and owns the retry timer.
///
/// At most one timer is pending per [`ReconnectState`]; arming a new one
/// aborts the previous.
#[derive(Debug)]
pub struct ReconnectScheduler {
    policy: BackoffPolicy,
    max_attempts: u32,
    next_token: AtomicU64,
}

impl ReconnectScheduler {
    /// Create a scheduler.
    pub fn new(policy: BackoffPolicy, max_attempts: u32) -> Self {
        Self {
            policy,
            max_attempts,
            next_token: AtomicU64::new(1),
        }
    }

    /// The backoff policy.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Retry limit.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Count the next retry and return its delay, or `None` once the limit
    /// has been reached. The counter never goes past `max_attempts`.
    pub fn next_delay(&self, state: &mut ReconnectState) -> Option<Duration> {
        if state.attempts >= self.max_attempts {
            return None;
        }
        state.attempts += 1;
        let delay = self.policy.delay_for(state.attempts);
        state.current_delay = delay;
        Some(delay)
    }

    /// Arm the retry timer, replacing any pending one. `on_fire` receives the
    /// timer token, which it passes to [`ReconnectScheduler::claim`].
    pub fn arm<F, Fut>(&self, state: &mut ReconnectState, delay: Duration, on_fire: F)
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel(state);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(token).await;
        });
        state.timer = Some(PendingTimer { token, handle });
    }

    /// Take ownership of a fired timer without aborting it. Returns `false`
    /// when the timer was cancelled or replaced in the meantime.
    pub fn claim(&self, state: &mut ReconnectState, token: u64) -> bool {
        match &state.timer {
            Some(timer) if timer.token == token => {
                state.timer = None;
                true
            }
            _ => false,
        }
    }

    /// Abort the pending timer, if any.
    pub fn cancel(&self, state: &mut ReconnectState) {
        if let Some(timer) = state.timer.take() {
            timer.handle.abort();
        }
    }

    /// Forget all retry history.
    pub fn reset(&self, state: &mut ReconnectState) {
        self.cancel(state);
        state.attempts = 0;
        state.current_delay = self.policy.initial_delay;
    }
}
