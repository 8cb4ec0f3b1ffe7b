// src/core/state.rs

//! Shared, per-server state handed to every connection task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing_subscriber::{filter::EnvFilter, reload};

use crate::config::Config;
use crate::core::cache::Cache;

/// Lightweight, lock-free counters surfaced over the metrics endpoint and
/// usable for ad-hoc diagnostics without touching Prometheus internals.
#[derive(Default)]
pub struct Stats {
    pub connections_accepted: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
}

impl Stats {
    pub fn record_accept(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reject(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }
}

/// The state shared across every connection handler: the resolved
/// configuration, the optional response cache, and a handful of
/// process-wide counters. Nothing in this crate reloads the configuration
/// after startup (no SIGHUP handler, unlike the teacher's live-reloadable
/// `Config`), so it's held behind a plain `Arc` rather than a lock --
/// every connection task clones the `Arc`, never the `Config` itself.
pub struct ServerState {
    pub config: Arc<Config>,
    pub cache: Option<Arc<Cache>>,
    pub stats: Stats,
    /// Handle to the global log filter, in an `Arc` per the teacher's
    /// `log_reload_handle` so any future control surface could call
    /// `.reload(...)` on it; nothing in this proxy does so today, since
    /// there is no `CONFIG SET`-style command to wire it to.
    pub log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
}

impl ServerState {
    pub fn new(
        config: Config,
        log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
    ) -> Arc<Self> {
        let cache = if config.cache.enabled {
            Some(Arc::new(Cache::new(config.cache.capacity)))
        } else {
            None
        };
        Arc::new(Self {
            config: Arc::new(config),
            cache,
            stats: Stats::default(),
            log_reload_handle,
        })
    }

    pub fn config_snapshot(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}
