//! Heartbeat: periodic liveness probes and dead-connection detection.
//!
//! A connection is declared dead once nothing has acknowledged a probe for
//! more than twice the configured timeout, measured from the last ack (or
//! from the connect itself when no ack has arrived yet).

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

use pushwire_core::config::HeartbeatPolicyConfig;

/// What the heartbeat loop should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTick {
    /// Keep probing.
    Continue,
    /// End the loop.
    Stop,
}

/// Heartbeat bookkeeping; meaningful only while connected.
#[derive(Debug, Default)]
pub struct HeartbeatState {
    /// Monotonic time of the last ack, used for expiry.
    pub last_ack: Option<Instant>,
    /// Wall-clock time of the last ack, reported in stats.
    pub last_ack_at: Option<DateTime<Utc>>,
    /// Wall-clock time of the last probe sent.
    pub last_probe_at: Option<DateTime<Utc>>,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatState {
    /// Whether a probe loop is running.
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

/// Drives the probe loop for one connection at a time.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
}

impl HeartbeatMonitor {
    /// Create a monitor probing every `interval`.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Probe interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Silence after which the connection counts as dead.
    pub fn dead_after(&self) -> Duration {
        self.timeout.saturating_mul(2)
    }

    /// Reset bookkeeping for a fresh connection; the connect counts as the first ack.
    pub fn restart(&self, state: &mut HeartbeatState) {
        state.last_ack = Some(Instant::now());
        state.last_ack_at = Some(Utc::now());
        state.last_probe_at = None;
    }

    /// Record a liveness acknowledgement.
    pub fn record_ack(&self, state: &mut HeartbeatState) {
        state.last_ack = Some(Instant::now());
        state.last_ack_at = Some(Utc::now());
    }

    /// Record that a probe is about to be sent.
    pub fn record_probe(&self, state: &mut HeartbeatState) {
        state.last_probe_at = Some(Utc::now());
    }

    /// Whether the silence since the last ack exceeds [`HeartbeatMonitor::dead_after`].
    pub fn is_expired(&self, state: &HeartbeatState, now: Instant) -> bool {
        match state.last_ack {
            Some(last_ack) => now.saturating_duration_since(last_ack) > self.dead_after(),
            None => false,
        }
    }

    /// Start the probe loop, replacing any running one. `tick` runs once per
    /// interval, first after one full interval. Ack bookkeeping is left as is.
    pub fn start<F, Fut>(&self, state: &mut HeartbeatState, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = HeartbeatTick> + Send + 'static,
    {
        if let Some(previous) = state.task.take() {
            previous.abort();
        }
        let interval = self.interval;
        state.task = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if tick().await == HeartbeatTick::Stop {
                    break;
                }
            }

            trace!("Heartbeat loop ended");
        }));
    }

    /// Abort the probe loop and clear the bookkeeping.
    pub fn stop(&self, state: &mut HeartbeatState) {
        if let Some(task) = self.detach(state) {
            task.abort();
        }
    }

    /// Clear the bookkeeping and hand back the loop task without aborting it.
    /// Used when the loop itself is the caller.
    pub fn detach(&self, state: &mut HeartbeatState) -> Option<JoinHandle<()>> {
        state.last_ack = None;
        state.last_ack_at = None;
        state.last_probe_at = None;
        state.task.take()
    }
}

impl From<&HeartbeatPolicyConfig> for HeartbeatMonitor {
    fn from(config: &HeartbeatPolicyConfig) -> Self {
        Self::new(config.interval(), config.timeout())
    }
}
