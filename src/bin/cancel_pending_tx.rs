//! Cancel Pending Transaction Utility
//!
//! Replaces the lowest stuck nonce of the vault address with a zero-value
//! self-transfer priced at the `fast` tier plus a fee bump, which unblocks
//! every later submission from the same key.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin cancel_pending_tx -- --chain-id 84532
//! cargo run --bin cancel_pending_tx -- --chain-id 84532 --bump-percent 30 --yes
//! ```

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ethereum_types::U256;
use tracing::info;

use fill_relayer::config::Config;
use fill_relayer::crypto::VaultSigner;
use fill_relayer::evm_client::{BlockTag, EvmClient, EvmRpc};
use fill_relayer::gas::{GasEngine, GasPlan, GasRequest, Priority, TxType};
use fill_relayer::registry::{Registry, StaticRegistry};
use fill_relayer::tx::UnsignedTransaction;

const CANCEL_GAS_LIMIT: u64 = 21_000;

#[derive(Parser, Debug)]
#[command(name = "cancel_pending_tx")]
#[command(about = "Replace a stuck vault transaction with a zero-value self-transfer")]
struct Args {
    /// Chain on which the transaction is stuck
    #[arg(long)]
    chain_id: u64,
    /// Extra fee on top of the fast tier, in percent
    #[arg(long, default_value_t = 20)]
    bump_percent: u32,
    /// Send without asking for confirmation
    #[arg(long)]
    yes: bool,
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
    let signer = VaultSigner::from_config(&config.vault)?;
    let address = signer.address();
    let rpc = EvmClient::new(&chain.rpc_url, Duration::from_secs(config.timeouts.rpc_timeout_secs), chain.is_poa)?;

    let confirmed = rpc.transaction_count(address, BlockTag::Latest).await?;
    let pending = rpc.transaction_count(address, BlockTag::Pending).await?;
    println!("Chain {} ({}), vault {:?}", chain.chain_id, chain.name, address);
    println!("  confirmed nonce: {}", confirmed);
    println!("  pending nonce:   {}", pending);

    if pending <= confirmed {
        println!("No pending transactions, nothing to cancel");
        return Ok(());
    }
    let stuck_nonce = confirmed;

    let quote = GasEngine::new(&config.gas_overrides)
        .quote(
            &rpc,
            &GasRequest {
                chain: &chain,
                from: address,
                priority: Priority::Fast,
                tx_type: TxType::EthTransfer,
                estimated_gas: Some(CANCEL_GAS_LIMIT),
                token: None,
            },
        )
        .await?;
    let mut plan = GasPlan::new(address, stuck_nonce, quote);
    plan.gas_limit = CANCEL_GAS_LIMIT;
    plan.fees = plan.fees.bumped(100 + args.bump_percent);

    println!("Cancellation transaction:");
    println!("  to:    {:?} (self)", address);
    println!("  value: 0");
    println!("  gas:   {}", plan.gas_limit);
    println!("  fees:  {:?}", plan.fees);
    println!("  nonce: {}", plan.nonce);

    if !args.yes && !confirm("Send cancellation transaction? (y/N): ")? {
        println!("Aborted");
        return Ok(());
    }

    let signed = UnsignedTransaction::from_plan(chain.chain_id, &plan, address, U256::zero(), Vec::new())
        .sign(&signer)?;
    let tx_hash = rpc
        .send_raw_transaction(&signed.raw)
        .await
        .context("broadcast of cancellation transaction failed")?;
    info!("Cancellation for nonce {} broadcast as {:?}", stuck_nonce, tx_hash);
    println!("Transaction hash: {:?}", tx_hash);

    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
