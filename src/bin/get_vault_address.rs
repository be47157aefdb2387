//! Get Vault EVM Address
//!
//! Reads the relayer configuration, loads the vault private key from the
//! environment variable it names and prints the derived EVM address. This is
//! the address that must hold fill liquidity and be whitelisted on the fill
//! relay contracts.

use anyhow::Result;
use fill_relayer::config::Config;
use fill_relayer::crypto::VaultSigner;

fn main() -> Result<()> {
    let config = Config::load()?;
    let signer = VaultSigner::from_config(&config.vault)?;

    println!("{:?}", signer.address());

    Ok(())
}
