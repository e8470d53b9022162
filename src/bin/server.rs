//! SMTP Gateway Server Binary

use anyhow::{Context, Result};
use clap::Parser;
use smtp_gateway::Gateway;
use smtp_gateway::config::{Config, generate_example_config};
use smtp_gateway::store::{MemoryStore, StoreEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// SMTP Gateway Server
#[derive(Parser, Debug)]
#[command(name = "smtp-gateway")]
#[command(about = "Minimal SMTP submission gateway")]
#[command(version = smtp_gateway::VERSION)]
struct Args {
    /// Name advertised in the banner and greeting replies
    server_name: Option<String>,

    /// Configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address override
    #[arg(long)]
    host: Option<String>,

    /// Listen port override
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print an example configuration file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", generate_example_config());
        return Ok(());
    }

    // Initialize logging; RUST_LOG wins over --debug
    let level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load config
    let mut config = if args.config.exists() {
        Config::from_file(&args.config)
            .with_context(|| format!("Failed to load {}", args.config.display()))?
    } else {
        info!("No config file found, using defaults");
        Config::default()
    };

    if let Some(server_name) = args.server_name {
        config.gateway.server_name = server_name;
    }
    if let Some(host) = args.host {
        config.gateway.host = host;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    config.gateway.validate()?;

    info!("SMTP Gateway {}", smtp_gateway::VERSION);

    let store = MemoryStore::new();
    tokio::spawn(log_stored_envelopes(store.clone()));

    let gateway = Gateway::new(config.gateway, Arc::new(store));

    tokio::select! {
        result = gateway.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}

/// Log every envelope the store records
async fn log_stored_envelopes(store: MemoryStore) {
    let mut events = store.subscribe();

    loop {
        match events.recv().await {
            Ok(StoreEvent::Added(envelope)) => {
                info!(
                    id = %envelope.id(),
                    from = envelope.from(),
                    to = ?envelope.recipients(),
                    bytes = envelope.body().map_or(0, str::len),
                    "Envelope stored"
                );
            }
            Ok(StoreEvent::Removed(id)) => info!(%id, "Envelope removed"),
            Err(RecvError::Lagged(skipped)) => warn!("Envelope log skipped {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}
