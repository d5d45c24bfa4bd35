//! signal-relay binary entry point.
//!
//! Usage:
//! ```bash
//! signal-relay --config relay.toml
//! signal-relay --bind 127.0.0.1:8000 --verbose
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use e2ee_signal_relay::config::Config;
use e2ee_signal_relay::http;
use e2ee_signal_relay::keystore::KeyStore;
use e2ee_signal_relay::registry::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Signaling relay and identity key directory.
#[derive(Parser, Debug)]
#[command(name = "signal-relay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults are used if it does not exist)
    #[arg(long, short, default_value = "relay.toml")]
    config: PathBuf,

    /// Override the listen address from the config file
    #[arg(long)]
    bind: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_file_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    // Initialize logging; RUST_LOG wins over the config file
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let keys = KeyStore::open(&config.storage.keys_file);
    let bind_address = config.server.bind_address.clone();
    let registry = Arc::new(Registry::new(config, keys));

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;

    tracing::info!(
        address = %bind_address,
        version = env!("CARGO_PKG_VERSION"),
        "Signal relay started"
    );

    http::serve(listener, registry, shutdown_signal()).await?;

    tracing::info!("Signal relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
