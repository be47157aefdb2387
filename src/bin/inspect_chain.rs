//! Chain Inspection Utility
//!
//! Reads live fee-market data from a configured chain and prints it next to
//! the registry's static flags, to check `is_l2` / `is_eip1559` / `is_poa`
//! before enabling a chain.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin inspect_chain -- --chain-id 97
//! ```

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use ethereum_types::H160;

use fill_relayer::config::Config;
use fill_relayer::evm_client::{EvmClient, EvmRpc};
use fill_relayer::gas::{GasEngine, GasRequest, Priority, TxType};
use fill_relayer::registry::{Registry, StaticRegistry};

#[derive(Parser, Debug)]
#[command(name = "inspect_chain")]
#[command(about = "Compare a chain's live fee market with its registry flags")]
struct Args {
    #[arg(long)]
    chain_id: u64,
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let registry = StaticRegistry::from_config(&config);
    let chain = registry.chain_by_id(args.chain_id)?;
    let rpc = EvmClient::new(&chain.rpc_url, Duration::from_secs(config.timeouts.rpc_timeout_secs), chain.is_poa)?;

    let live_chain_id = rpc.chain_id().await?;
    let block = rpc.latest_block().await?;

    println!("Chain {} ({})", chain.chain_id, chain.name);
    println!("Registry flags:");
    println!("  class:      {:?}", chain.class);
    println!("  is_l2:      {}", chain.is_l2);
    println!("  is_eip1559: {}", chain.is_eip1559);
    println!("  is_poa:     {}", chain.is_poa);
    println!("  is_mainnet: {}", chain.is_mainnet);
    println!("Live data:");
    println!("  eth_chainId:     {}", live_chain_id);
    if live_chain_id != chain.chain_id {
        println!("  WARNING: RPC endpoint serves chain {}, not {}", live_chain_id, chain.chain_id);
    }
    println!("  block:           {}", block.number);
    match block.base_fee_per_gas {
        Some(base_fee) => println!("  baseFeePerGas:   {} wei", base_fee),
        None => println!("  baseFeePerGas:   absent (legacy pricing only)"),
    }
    match rpc.max_priority_fee_per_gas().await {
        Ok(tip) => println!("  priority fee:    {} wei", tip),
        Err(e) => println!("  priority fee:    unavailable ({})", e),
    }
    println!("  gas price:       {} wei", rpc.gas_price().await?);
    if block.gas_limit > 0 {
        println!(
            "  utilisation:     {}/{} ({}%){}",
            block.gas_used,
            block.gas_limit,
            block.gas_used * 100 / block.gas_limit,
            if block.is_congested() { " congested" } else { "" }
        );
    }
    println!(
        "  extraData:       {} bytes{}",
        block.extra_data_len,
        if block.extra_data_len > 32 { " (POA header)" } else { "" }
    );

    if block.base_fee_per_gas.is_some() != chain.is_eip1559 {
        println!("NOTE: is_eip1559 flag disagrees with the live block header");
    }
    if (block.extra_data_len > 32) != chain.is_poa {
        println!("NOTE: is_poa flag disagrees with the live block header");
    }

    let engine = GasEngine::new(&config.gas_overrides);
    if let Some(over) = config.gas_override(chain.chain_id) {
        println!("Gas override active: {:?}", over);
    }
    println!("Gas quotes (standard tier):");
    for tx_type in TxType::ALL {
        let quote = engine
            .quote(
                &rpc,
                &GasRequest {
                    chain: &chain,
                    from: H160::zero(),
                    priority: Priority::Standard,
                    tx_type,
                    estimated_gas: Some(engine.tuning(&chain).static_limit(tx_type)),
                    token: None,
                },
            )
            .await?;
        println!("  {:?}: gas_limit={} fees={:?}", tx_type, quote.gas_limit, quote.fees);
    }

    Ok(())
}
