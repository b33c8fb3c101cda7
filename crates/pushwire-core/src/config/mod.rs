//! Application configuration schemas.
//!
//! Configuration is deserialized from TOML files via the `config` crate,
//! overlaid with `PUSHWIRE__`-prefixed environment variables. Each
//! sub-module represents a logical configuration section.

pub mod connection;
pub mod logging;

use serde::{Deserialize, Serialize};

pub use self::connection::{ConnectionConfig, HeartbeatPolicyConfig, ReconnectPolicyConfig};
pub use self::logging::LoggingConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// Top-level deserialization target for the merged configuration sources
/// (`config/default` + `config/{env}` + environment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Managed connection settings.
    pub connection: ConnectionConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration for the given environment name.
    ///
    /// Merges `config/default` with an environment-specific overlay and
    /// environment variables such as `PUSHWIRE__CONNECTION__ENDPOINT`.
    /// Both files are optional; the endpoint must come from somewhere.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("PUSHWIRE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let app: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        app.connection.validate()?;
        Ok(app)
    }
}
