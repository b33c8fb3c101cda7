//! Pushwire Monitor: keeps one push connection alive and logs its traffic.
//!
//! Main entry point that wires the configuration, logging and connection
//! manager together and runs until Ctrl+C / SIGTERM.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, fmt};

use pushwire_core::config::AppConfig;
use pushwire_core::error::AppError;
use pushwire_realtime::{ConnectionManager, WebSocketTransport};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Monitor error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from files and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("PUSHWIRE_ENV").unwrap_or_else(|_| "development".to_string());

    AppConfig::load(&env).map_err(|e| AppError::configuration(format!("Config load error: {}", e)))
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main monitor run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Pushwire Monitor v{}", env!("CARGO_PKG_VERSION"));

    let connection_config = config.connection.clone();
    let auto_reconnect = connection_config.auto_reconnect;
    let manager = ConnectionManager::new(connection_config, Arc::new(WebSocketTransport::new()))?;

    // ── Lifecycle listeners ──────────────────────────────────────
    let _connected = manager.on_connected(|event| {
        tracing::info!(
            "Connected to {} (conn_id: {})",
            event.endpoint,
            event.connection_id
        );
    });
    let _disconnected = manager.on_disconnected(|event| {
        tracing::warn!(
            "Disconnected from {} (conn_id: {}, reason: {})",
            event.endpoint,
            event.connection_id,
            event.reason.as_str()
        );
    });
    let _errors = manager.on_error(|error| {
        tracing::warn!("Connection error: {}", error);
    });

    // ── Initial connect ──────────────────────────────────────────
    tracing::info!("Connecting to {}...", manager.endpoint());
    if let Err(e) = manager.connect().await {
        if !auto_reconnect {
            return Err(e);
        }
        tracing::warn!("Initial connect failed, retrying in background: {}", e);
    }

    // ── Message loop ─────────────────────────────────────────────
    let mut messages = manager.messages();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
            received = messages.recv() => match received {
                Ok(payload) => match std::str::from_utf8(&payload) {
                    Ok(text) => tracing::info!("Received: {}", text),
                    Err(_) => tracing::info!("Received {} binary bytes", payload.len()),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Message loop lagged, {} payloads skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────
    let stats = manager.stats();
    manager.destroy().await;

    let summary = serde_json::to_string(&stats)?;
    tracing::info!("Final connection stats: {}", summary);
    tracing::info!("Pushwire Monitor shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
