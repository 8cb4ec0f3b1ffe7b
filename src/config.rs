// src/config.rs

//! Manages server configuration: loading, resolving dynamic values, and validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// A raw representation of the config file before validation and resolution.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default = "default_initial_buffer_bytes")]
    initial_buffer_bytes: usize,
    #[serde(default = "default_max_buffer_bytes")]
    max_buffer_bytes: usize,
    #[serde(default = "default_chunk_size_bytes")]
    chunk_size_bytes: usize,
    #[serde(default = "default_upstream_connect_timeout", with = "humantime_serde")]
    upstream_connect_timeout: Duration,
    #[serde(default = "default_upstream_read_timeout", with = "humantime_serde")]
    upstream_read_timeout: Duration,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7878
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10_000
}
fn default_initial_buffer_bytes() -> usize {
    4 * 1024
}
fn default_max_buffer_bytes() -> usize {
    64 * 1024
}
fn default_chunk_size_bytes() -> usize {
    16 * 1024
}
fn default_upstream_connect_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_upstream_read_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Configuration for the response cache.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_enabled() -> bool {
    true
}
fn default_cache_capacity() -> usize {
    256
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            capacity: default_cache_capacity(),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    8878
}

/// Represents the final, validated, and resolved server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub max_clients: usize,
    pub initial_buffer_bytes: usize,
    pub max_buffer_bytes: usize,
    pub chunk_size_bytes: usize,
    #[serde(with = "humantime_serde")]
    pub upstream_connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub upstream_read_timeout: Duration,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            initial_buffer_bytes: default_initial_buffer_bytes(),
            max_buffer_bytes: default_max_buffer_bytes(),
            chunk_size_bytes: default_chunk_size_bytes(),
            upstream_connect_timeout: default_upstream_connect_timeout(),
            upstream_read_timeout: default_upstream_read_timeout(),
            cache: CacheConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let raw_config: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;

        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            log_level: raw_config.log_level,
            max_clients: raw_config.max_clients,
            initial_buffer_bytes: raw_config.initial_buffer_bytes,
            max_buffer_bytes: raw_config.max_buffer_bytes,
            chunk_size_bytes: raw_config.chunk_size_bytes,
            upstream_connect_timeout: raw_config.upstream_connect_timeout,
            upstream_read_timeout: raw_config.upstream_read_timeout,
            cache: raw_config.cache,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.max_buffer_bytes < self.initial_buffer_bytes {
            return Err(anyhow!(
                "max_buffer_bytes ({}) cannot be smaller than initial_buffer_bytes ({})",
                self.max_buffer_bytes,
                self.initial_buffer_bytes
            ));
        }
        if self.chunk_size_bytes == 0 {
            return Err(anyhow!("chunk_size_bytes cannot be 0"));
        }

        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(anyhow!("cache.capacity cannot be 0 when the cache is enabled"));
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }

        if self.max_clients > 100_000 {
            warn!(
                max_clients = self.max_clients,
                "very large max_clients setting; each connection holds a tokio task and socket"
            );
        }

        Ok(())
    }
}
