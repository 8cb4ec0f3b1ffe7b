// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::metrics;
use std::net::SocketAddr;
use tracing::debug;

/// An RAII guard to ensure connection resources are always cleaned up when a
/// connection handler's scope is exited, win or lose.
pub struct ConnectionGuard {
    addr: SocketAddr,
}

impl ConnectionGuard {
    pub(crate) fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        debug!(addr = %self.addr, "connection closed");
    }
}
