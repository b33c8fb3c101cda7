//! Managed connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Settings for one managed push connection.
///
/// Only `endpoint` is required; everything else falls back to the defaults
/// below when omitted from the configuration source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Endpoint URL handed to the transport, e.g. `wss://host/stream`.
    pub endpoint: String,
    /// Re-dial automatically after a failed dial or an unexpected close.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// Consecutive automatic retries before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Run the liveness probe while connected.
    #[serde(default = "default_true")]
    pub heartbeat_enabled: bool,
    /// Upper bound on a single dial, in milliseconds.
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_ms: u64,
    /// Capacity of the pushed-message broadcast channel.
    #[serde(default = "default_message_buffer")]
    pub message_buffer_size: usize,
    /// Backoff settings.
    #[serde(default)]
    pub reconnect: ReconnectPolicyConfig,
    /// Liveness probe settings.
    #[serde(default)]
    pub heartbeat: HeartbeatPolicyConfig,
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPolicyConfig {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Cap on any retry delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Growth factor applied per retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

/// Liveness probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatPolicyConfig {
    /// Interval between probes, in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,
    /// Acknowledgement timeout, in milliseconds. The connection is declared
    /// dead once no ack has arrived for twice this long.
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_ms: u64,
}

impl Default for ReconnectPolicyConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for HeartbeatPolicyConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
            timeout_ms: default_heartbeat_timeout(),
        }
    }
}

impl ConnectionConfig {
    /// Build a config for `endpoint` with every other field defaulted.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auto_reconnect: true,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_enabled: true,
            dial_timeout_ms: default_dial_timeout(),
            message_buffer_size: default_message_buffer(),
            reconnect: ReconnectPolicyConfig::default(),
            heartbeat: HeartbeatPolicyConfig::default(),
        }
    }

    /// Dial timeout as a [`Duration`].
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// Check the settings for values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.endpoint.trim().is_empty() {
            return Err(AppError::configuration("connection.endpoint must not be empty"));
        }
        if self.dial_timeout_ms == 0 {
            return Err(AppError::configuration(
                "connection.dial_timeout_ms must be greater than zero",
            ));
        }
        if self.message_buffer_size == 0 {
            return Err(AppError::configuration(
                "connection.message_buffer_size must be greater than zero",
            ));
        }

        let reconnect = &self.reconnect;
        if reconnect.initial_delay_ms == 0 {
            return Err(AppError::configuration(
                "connection.reconnect.initial_delay_ms must be greater than zero",
            ));
        }
        if reconnect.max_delay_ms < reconnect.initial_delay_ms {
            return Err(AppError::configuration(format!(
                "connection.reconnect.max_delay_ms ({}) is below initial_delay_ms ({})",
                reconnect.max_delay_ms, reconnect.initial_delay_ms
            )));
        }
        if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
            return Err(AppError::configuration(format!(
                "connection.reconnect.multiplier must be a finite value >= 1.0, got {}",
                reconnect.multiplier
            )));
        }

        if self.heartbeat.interval_ms == 0 || self.heartbeat.timeout_ms == 0 {
            return Err(AppError::configuration(
                "connection.heartbeat interval and timeout must be greater than zero",
            ));
        }
        // Expiry is checked before each probe, so an interval of twice the
        // timeout or more would expire an acking connection at its first tick.
        if self.heartbeat.interval_ms >= self.heartbeat.timeout_ms.saturating_mul(2) {
            return Err(AppError::configuration(format!(
                "connection.heartbeat.interval_ms ({}) must be less than twice timeout_ms ({})",
                self.heartbeat.interval_ms, self.heartbeat.timeout_ms
            )));
        }

        Ok(())
    }
}

impl ReconnectPolicyConfig {
    /// Initial delay as a [`Duration`].
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Maximum delay as a [`Duration`].
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl HeartbeatPolicyConfig {
    /// Probe interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Ack timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_dial_timeout() -> u64 {
    10_000
}

fn default_message_buffer() -> usize {
    256
}

fn default_initial_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_heartbeat_interval() -> u64 {
    15_000
}

fn default_heartbeat_timeout() -> u64 {
    10_000
}
