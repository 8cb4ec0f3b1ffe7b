// src/server/metrics_server.rs

use crate::core::metrics::{gather_metrics, CACHE_ENTRIES};
use crate::core::state::ServerState;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Handles HTTP requests to the /metrics endpoint.
async fn metrics_handler(state: Arc<ServerState>) -> impl IntoResponse {
    if let Some(cache) = state.cache.as_ref() {
        CACHE_ENTRIES.set(cache.len() as f64);
    }
    let body = gather_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

/// Runs a simple HTTP server to expose Prometheus metrics on /metrics.
pub async fn run_metrics_server(state: Arc<ServerState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let port = state.config_snapshot().metrics.port;

    let app = Router::new().route("/metrics", get(move || metrics_handler(state.clone())));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "Prometheus metrics server listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(port, error = %e, "failed to bind metrics server");
            return;
        }
    };

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Metrics server shutting down.");
        })
        .await;

    if let Err(e) = serve_result {
        error!(error = %e, "metrics server exited with an error");
    }
}
