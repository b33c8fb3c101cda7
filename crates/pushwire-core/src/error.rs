//! Unified error types for Pushwire.
//!
//! Every failure the connection runtime can report is an [`AppError`] tagged
//! with an [`ErrorKind`], so callers can branch on the category without
//! matching on message text.

use std::fmt;
use thiserror::Error;

/// Error categories used across Pushwire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// A dial attempt failed or timed out.
    Connection,
    /// The transport reported a failure on an established connection.
    Transport,
    /// No liveness acknowledgement arrived within the allowed window.
    HeartbeatTimeout,
    /// The manager has been destroyed and refuses further work.
    Destroyed,
    /// An operation needed a live connection and there was none.
    NotConnected,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "CONNECTION"),
            Self::Transport => write!(f, "TRANSPORT"),
            Self::HeartbeatTimeout => write!(f, "HEARTBEAT_TIMEOUT"),
            Self::Destroyed => write!(f, "DESTROYED"),
            Self::NotConnected => write!(f, "NOT_CONNECTED"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified error used throughout Pushwire.
///
/// Transport implementations map their native errors into `AppError` with
/// [`AppError::with_source`] so the original cause stays reachable through
/// [`std::error::Error::source`].
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection (dial) error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Create a heartbeat timeout error.
    pub fn heartbeat_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HeartbeatTimeout, message)
    }

    /// Create a destroyed-manager error.
    pub fn destroyed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Destroyed, message)
    }

    /// Create a not-connected error.
    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotConnected, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Whether a later attempt at the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Connection | ErrorKind::Transport | ErrorKind::HeartbeatTimeout
        )
    }
}

// The source is dropped on clone; shared dial results only need kind and message.
impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
