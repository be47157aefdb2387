//! Fill Relayer Service
//!
//! Runs the webhook API that receives deposit notifications and fills each
//! deposit on its destination chain.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin fill-relayer -- --config config/fill-relayer.toml
//! ```
//!
//! Or set the config path via environment variable:
//!
//! ```bash
//! FILL_RELAYER_CONFIG_PATH=config/fill-relayer.toml cargo run --bin fill-relayer
//! ```

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::info;

use fill_relayer::api::run_server;
use fill_relayer::config::{Config, CONFIG_PATH_ENV};
use fill_relayer::FillOrchestrator;

#[derive(Parser, Debug)]
#[command(name = "fill-relayer")]
#[command(about = "Cross-chain fill relay executor")]
struct Args {
    /// Path to configuration file (default: config/fill-relayer.toml or FILL_RELAYER_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    info!("Starting Fill Relayer Service");

    // Priority: CLI arg > env var > default
    let config = if let Some(path) = args.config {
        info!("Loading configuration from: {}", path);
        Config::load_from(&path)?
    } else {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            info!("Loading configuration from {}: {}", CONFIG_PATH_ENV, path);
        } else {
            info!("Loading configuration from default location");
        }
        Config::load()?
    };

    info!("Configuration loaded successfully");
    info!("Fill rate: {}", config.service.fill_rate);
    info!("Authorized vaults: {:?}", config.service.authorized_vaults);
    for chain in &config.chains {
        info!(
            "Chain {} ({}): network={} mainnet={} fill_contract={:?}",
            chain.chain_id, chain.name, chain.network, chain.is_mainnet, chain.fill_relay_contract
        );
    }

    let orchestrator = Arc::new(FillOrchestrator::from_config(&config).await?);
    let server = run_server(orchestrator, config.service.host.clone(), config.service.port);

    tokio::select! {
        _ = server => {}

        // Graceful shutdown on Ctrl+C
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal, stopping");
        }
    }

    info!("Fill relayer stopped");
    Ok(())
}
