// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Gauge, TextEncoder,
};

lazy_static! {
    // --- Server-wide Gauges ---
    /// The number of clients currently connected to the proxy.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("proxy_connected_clients", "Number of currently connected clients.").unwrap();
    /// The number of entries currently held in the response cache.
    pub static ref CACHE_ENTRIES: Gauge =
        register_gauge!("proxy_cache_entries", "Number of entries currently held in the response cache.").unwrap();

    // --- Server-wide Counters ---
    /// The total number of connections accepted by the server since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("proxy_connections_received_total", "Total number of connections received.").unwrap();
    /// The total number of connections rejected because `max_clients` was reached.
    pub static ref CONNECTIONS_REJECTED_TOTAL: Counter =
        register_counter!("proxy_connections_rejected_total", "Total number of connections rejected due to the client limit.").unwrap();

    // --- Cache Counters ---
    /// The total number of successful cache lookups.
    pub static ref CACHE_HITS_TOTAL: Counter =
        register_counter!("proxy_cache_hits_total", "Total number of cache hits.").unwrap();
    /// The total number of failed cache lookups.
    pub static ref CACHE_MISSES_TOTAL: Counter =
        register_counter!("proxy_cache_misses_total", "Total number of cache misses.").unwrap();
    /// The total number of cache entries evicted to make room for a new entry.
    pub static ref CACHE_EVICTIONS_TOTAL: Counter =
        register_counter!("proxy_cache_evictions_total", "Total number of cache entries evicted.").unwrap();

    // --- Request outcome counters, labeled by the reason a request failed. ---
    /// Requests that failed before any origin connection was attempted
    /// (malformed request line, unsupported method/version), labeled by reason.
    pub static ref REQUESTS_REJECTED_TOTAL: CounterVec =
        register_counter_vec!("proxy_requests_rejected_total", "Requests rejected before reaching an origin, labeled by reason.", &["reason"]).unwrap();
    /// Failures while talking to the origin server, labeled by stage.
    pub static ref UPSTREAM_ERRORS_TOTAL: CounterVec =
        register_counter_vec!("proxy_upstream_errors_total", "Failures while connecting to or reading from an origin, labeled by stage.", &["stage"]).unwrap();
    /// Failures while writing a response back to the client.
    pub static ref CLIENT_WRITE_ERRORS_TOTAL: Counter =
        register_counter!("proxy_client_write_errors_total", "Total number of failed writes back to a client.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
