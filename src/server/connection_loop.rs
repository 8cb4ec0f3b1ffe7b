// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use crate::connection::ConnectionHandler;
use crate::core::metrics;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

// Platform-specific signal handling imports
#[cfg(windows)]
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Waits for a shutdown signal based on the operating system.
/// On Unix, it listens for SIGINT and SIGTERM.
/// On Windows, it listens for Ctrl+C.
async fn await_shutdown_signal() {
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to create SIGINT stream");
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to create SIGTERM stream");

    #[cfg(windows)]
    let mut ctrl_c = signal::ctrl_c().expect("Failed to create Ctrl+C stream");

    tokio::select! {
        _ = async { #[cfg(unix)] { sigint.recv().await; info!("SIGINT received, initiating graceful shutdown."); } } => {},
        _ = async { #[cfg(unix)] { sigterm.recv().await; info!("SIGTERM received, initiating graceful shutdown."); } } => {},
        _ = async { #[cfg(windows)] { ctrl_c.await; info!("Ctrl-C received, initiating graceful shutdown."); } } => {},
    }
}

/// The main server loop that accepts connections and handles graceful shutdown.
pub async fn run(mut ctx: ServerContext) {
    let mut session_id_counter: u64 = 0;
    let mut client_tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased; // Prioritize shutdown signals over other events.

            _ = await_shutdown_signal() => {
                break;
            },

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => info!("A background task has completed."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = ctx.listener.accept() => {
                if let Ok((socket, addr)) = res {
                    let Ok(permit) = ctx.connection_permits.clone().try_acquire_owned() else {
                        warn!("Rejecting connection from {}: max_clients reached", addr);
                        ctx.state.stats.record_reject();
                        metrics::CONNECTIONS_REJECTED_TOTAL.inc();
                        continue;
                    };

                    info!("Accepted new connection from: {}", addr);
                    ctx.state.stats.record_accept();
                    metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
                    metrics::CONNECTED_CLIENTS.inc();

                    session_id_counter = session_id_counter.wrapping_add(1);
                    let session_id = session_id_counter;
                    let state_clone = ctx.state.clone();
                    let global_shutdown_rx = ctx.shutdown_tx.subscribe();

                    client_tasks.spawn(async move {
                        let _permit = permit;
                        let mut handler = ConnectionHandler::new(socket, addr, state_clone, session_id);
                        handler.run(global_shutdown_rx).await;
                    });
                } else if let Err(e) = res {
                    error!("Failed to accept connection: {}", e);
                }
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res {
                    if e.is_panic() {
                        error!("A client handler panicked: {e:?}");
                    }
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
    }

    client_tasks.shutdown().await;
    info!("All client connections closed.");

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    }
    info!("Server shutdown complete.");
}
