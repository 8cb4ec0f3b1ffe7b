// src/main.rs

//! The main entry point for the proxy server application.

use anyhow::Result;
use proxide::config::Config;
use proxide::server;
use std::env;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("proxide version {VERSION}");
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        match args.get(port_index + 1).map(|s| s.parse::<u16>()) {
            Some(Ok(port)) => config.port = port,
            Some(Err(_)) => {
                eprintln!("Invalid port number for --port");
                std::process::exit(1);
            }
            None => {
                eprintln!("--port flag requires a value");
                std::process::exit(1);
            }
        }
    }

    // RUST_LOG, if set, takes priority over the resolved config's log_level.
    let initial_log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());

    // A reloadable filter layer: nothing in this proxy changes the log level
    // at runtime today (no CONFIG SET analogue), but the handle is kept and
    // threaded through in case a future control surface wants it.
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    let reload_handle = Arc::new(reload_handle);

    if let Err(e) = server::run(config, reload_handle).await {
        error!("server runtime error: {e:#}");
        return Err(e);
    }

    Ok(())
}
