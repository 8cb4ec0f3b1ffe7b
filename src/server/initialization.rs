// src/server/initialization.rs

//! Handles the complete server initialization process: building shared
//! state and binding the listening socket.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::ServerState;
use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, reload};

/// Initializes all server components before starting the main loop.
pub async fn setup(
    config: Config,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let host = config.host.clone();
    let port = config.port;
    let max_clients = config.max_clients;

    let server_state = ServerState::new(config, log_reload_handle);
    info!("Server state initialized.");

    let listener = TcpListener::bind((host.as_str(), port)).await?;
    info!("Proxy listening on {}:{}", host, port);

    let connection_permits = Arc::new(Semaphore::new(max_clients));

    Ok(ServerContext {
        state: server_state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        connection_permits,
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        max_clients = config.max_clients,
        cache_enabled = config.cache.enabled,
        cache_capacity = config.cache.capacity,
        "starting proxy with resolved configuration"
    );
}
