// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use anyhow::Result;
use std::time::Duration;
use tracing::info;

/// Spawns all background tasks into the provided JoinSet.
pub async fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let server_state = ctx.state.clone();
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    let metrics_enabled = server_state.config_snapshot().metrics.enabled;

    if metrics_enabled {
        let metrics_state = server_state.clone();
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_state, shutdown_rx_metrics).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    // A small periodic stats log, mirroring the source's habit of a
    // lightweight maintenance task alongside the accept loop.
    let stats_state = server_state.clone();
    let mut stats_shutdown = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let cache_len = stats_state.cache.as_ref().map(|c| c.len()).unwrap_or(0);
                    info!(
                        connections_accepted = stats_state.stats.connections_accepted.load(std::sync::atomic::Ordering::Relaxed),
                        connections_rejected = stats_state.stats.connections_rejected.load(std::sync::atomic::Ordering::Relaxed),
                        cache_hits = stats_state.stats.cache_hits.load(std::sync::atomic::Ordering::Relaxed),
                        cache_misses = stats_state.stats.cache_misses.load(std::sync::atomic::Ordering::Relaxed),
                        cache_len,
                        "periodic stats"
                    );
                }
                _ = stats_shutdown.recv() => break,
            }
        }
        Ok(())
    });

    info!("All background tasks have been spawned.");
    Ok(())
}
