//! Exponential backoff with a fixed cap.

use std::time::Duration;

use pushwire_core::config::ReconnectPolicyConfig;

/// Retry delay policy.
///
/// Retries are numbered from 1: `delay(i) = min(initial * multiplier^(i-1), max)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Growth factor per retry.
    pub multiplier: f64,
}

impl BackoffPolicy {
    /// Create a policy.
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
        }
    }

    /// Delay before retry number `attempt` (1-based; 0 is treated as 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let initial_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let scaled = initial_ms * self.multiplier.powi(exponent);
        let capped = if scaled.is_finite() { scaled.min(max_ms) } else { max_ms };
        Duration::from_millis(capped.round() as u64)
    }
}

impl From<&ReconnectPolicyConfig> for BackoffPolicy {
    fn from(config: &ReconnectPolicyConfig) -> Self {
        Self::new(config.initial_delay(), config.max_delay(), config.multiplier)
    }
}
