// src/core/mod.rs

//! The central module containing the core logic and data structures of the proxy.

pub mod cache;
pub mod errors;
pub mod http;
pub mod metrics;
pub mod state;

pub use errors::ProxyError;
pub use state::ServerState;
