//! Configuration Management Module
//!
//! Loads the relayer configuration from TOML: webhook server settings, the
//! fill rate and vault allow-list, chain and token tables, store and timeout
//! settings, and per-chain gas tuning overrides. The vault private key is
//! never stored in the file; the config names the environment variable that
//! holds it.

use std::collections::HashSet;
use std::time::Duration;

use ethereum_types::H160;
use serde::{Deserialize, Serialize};

use crate::amount::FillRate;
use crate::dedup::DEFAULT_DEDUP_TTL;
use crate::gas::{Priority, MIN_BUFFER_PERCENT};

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "FILL_RELAYER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/fill-relayer.toml";

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Webhook server, fill rate and vault allow-list
    pub service: ServiceConfig,
    /// Bounded waits used by the submitter
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Dedup / nonce-lock store settings
    #[serde(default)]
    pub store: StoreConfig,
    /// Transaction-line record output
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Vault signing key location
    #[serde(default)]
    pub vault: VaultConfig,
    /// Chains the relayer knows about (origin and destination)
    #[serde(default, rename = "chain")]
    pub chains: Vec<ChainConfig>,
    /// Tokens per chain, grouped into cross-chain equivalence classes
    #[serde(default, rename = "token")]
    pub tokens: Vec<TokenConfig>,
    /// Per-chain gas tuning that replaces the built-in defaults
    #[serde(default, rename = "gas_override")]
    pub gas_overrides: Vec<GasOverrideConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Decimal string, e.g. "0.9995". Output = input * fill_rate.
    #[serde(default = "default_fill_rate")]
    pub fill_rate: String,
    /// Vaults whose deposits this relayer services
    pub authorized_vaults: Vec<H160>,
    /// Fee tier used for fill transactions
    #[serde(default)]
    pub priority: Priority,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3335
}

fn default_fill_rate() -> String {
    "0.9".to_string()
}

/// Upper bounds for every wait the submitter performs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Budget for an earlier pending transaction to confirm
    pub pending_wait_secs: u64,
    /// Poll interval while waiting on pending transactions
    pub pending_poll_ms: u64,
    /// Budget for an "already known" transaction to confirm
    pub already_known_wait_secs: u64,
    /// Budget for the receipt after broadcast
    pub confirmation_wait_secs: u64,
    pub confirmation_poll_ms: u64,
    /// Per JSON-RPC call timeout
    pub rpc_timeout_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            pending_wait_secs: 60,
            pending_poll_ms: 1000,
            already_known_wait_secs: 30,
            confirmation_wait_secs: 120,
            confirmation_poll_ms: 2000,
            rpc_timeout_secs: 15,
        }
    }
}

impl TimeoutConfig {
    pub fn pending_wait(&self) -> Duration {
        Duration::from_secs(self.pending_wait_secs)
    }

    pub fn pending_poll(&self) -> Duration {
        Duration::from_millis(self.pending_poll_ms)
    }

    pub fn already_known_wait(&self) -> Duration {
        Duration::from_secs(self.already_known_wait_secs)
    }

    pub fn confirmation_wait(&self) -> Duration {
        Duration::from_secs(self.confirmation_wait_secs)
    }

    pub fn confirmation_poll(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }
}

/// Shared key-value store settings.
///
/// Without `redis_url` the relayer falls back to an in-process LRU for dedup
/// and in-process nonce sequencing, which only protects a single instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub redis_url: Option<String>,
    /// Capacity of the in-process dedup LRU
    pub lru_capacity: usize,
    pub dedup_ttl_secs: u64,
    /// Allocate nonces through the shared store (multi-instance deployments)
    pub distributed_nonce: bool,
    pub nonce_lock_ttl_secs: u64,
    pub nonce_lock_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            lru_capacity: 10_000,
            dedup_ttl_secs: DEFAULT_DEDUP_TTL.as_secs(),
            distributed_nonce: false,
            nonce_lock_ttl_secs: 10,
            nonce_lock_attempts: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Append-only JSON lines file for deposit/fill transaction records
    pub tx_lines_path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { tx_lines_path: "data/tx_lines.jsonl".to_string() }
    }
}

/// Keys are loaded from environment variables at runtime.
/// The config file contains the environment variable name, not the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Environment variable holding the hex secp256k1 private key
    /// Default: "VAULT_PRIVATE_KEY"
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self { private_key_env: default_private_key_env() }
    }
}

fn default_private_key_env() -> String {
    "VAULT_PRIVATE_KEY".to_string()
}

impl VaultConfig {
    /// Loads the private key from the environment variable.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The private key (hex encoded)
    /// * `Err(anyhow::Error)` - Failed to load from environment
    pub fn get_private_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.private_key_env).map_err(|_| {
            anyhow::anyhow!(
                "Environment variable '{}' not set. Please set it with the vault's secp256k1 private key (hex encoded).",
                self.private_key_env
            )
        })
    }
}

/// One EVM chain the relayer reads deposits from or fills on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Human-readable name for the chain
    pub name: String,
    pub chain_id: u64,
    /// Webhook provider network name, e.g. "ETH_SEPOLIA"
    pub network: String,
    pub rpc_url: String,
    pub deposit_contract: H160,
    /// Destination-side contract; chains without one can only be origins
    #[serde(default)]
    pub fill_relay_contract: Option<H160>,
    pub is_mainnet: bool,
    /// Overrides the built-in L1 allow-list
    #[serde(default)]
    pub is_l2: Option<bool>,
    /// Overrides the built-in non-EIP-1559 deny-list
    #[serde(default)]
    pub is_eip1559: Option<bool>,
    /// Overrides the built-in POA list
    #[serde(default)]
    pub is_poa: Option<bool>,
}

/// One token on one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub chain_id: u64,
    pub symbol: String,
    /// Cross-chain equivalence class, e.g. "USDC"
    pub group: String,
    /// Zero address for the native coin
    pub address: H160,
    pub decimals: u8,
}

/// Replaces individual gas tuning constants for one chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GasOverrideConfig {
    pub chain_id: u64,
    /// Gas limit buffer in percent, applied to every transaction type; at least 130
    #[serde(default)]
    pub buffer_percent: Option<u32>,
    /// `k` in `max_fee = base_fee * k + priority_fee`, in percent
    #[serde(default)]
    pub base_fee_multiplier_percent: Option<u32>,
    /// Priority fee as a percentage of base fee (L2 path)
    #[serde(default)]
    pub priority_fee_percent_of_base: Option<u32>,
    /// Legacy gas price multipliers for slow / standard / fast, in percent
    #[serde(default)]
    pub legacy_multipliers_percent: Option<[u32; 3]>,
    #[serde(default)]
    pub min_gas_price_wei: Option<u64>,
    #[serde(default)]
    pub min_priority_fee_wei: Option<u64>,
}

// ============================================================================
// LOADING / VALIDATION
// ============================================================================

impl Config {
    /// Validates cross-field invariants that serde cannot express.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Configuration is usable
    /// * `Err(anyhow::Error)` - First violated invariant
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.service.authorized_vaults.is_empty() {
            return Err(anyhow::anyhow!(
                "Configuration error: service.authorized_vaults is empty. At least one vault must be authorized."
            ));
        }

        FillRate::parse(&self.service.fill_rate)
            .map_err(|e| anyhow::anyhow!("Configuration error: service.fill_rate: {}", e))?;

        if self.store.dedup_ttl_secs == 0 {
            return Err(anyhow::anyhow!("Configuration error: store.dedup_ttl_secs must be positive"));
        }
        if self.store.distributed_nonce && self.store.redis_url.is_none() {
            return Err(anyhow::anyhow!(
                "Configuration error: store.distributed_nonce requires store.redis_url"
            ));
        }
        if self.timeouts.pending_poll_ms == 0 || self.timeouts.confirmation_poll_ms == 0 {
            return Err(anyhow::anyhow!("Configuration error: poll intervals must be positive"));
        }

        let mut chain_ids = HashSet::new();
        let mut networks = HashSet::new();
        for chain in &self.chains {
            if !chain_ids.insert(chain.chain_id) {
                return Err(anyhow::anyhow!(
                    "Configuration error: chain ID {} is configured more than once. Each chain must have a unique chain ID.",
                    chain.chain_id
                ));
            }
            if !networks.insert(chain.network.to_uppercase()) {
                return Err(anyhow::anyhow!(
                    "Configuration error: network '{}' is configured more than once.",
                    chain.network
                ));
            }
            url::Url::parse(&chain.rpc_url).map_err(|e| {
                anyhow::anyhow!("Configuration error: chain {} rpc_url '{}': {}", chain.chain_id, chain.rpc_url, e)
            })?;
        }

        let mut groups = HashSet::new();
        for token in &self.tokens {
            if !chain_ids.contains(&token.chain_id) {
                return Err(anyhow::anyhow!(
                    "Configuration error: token {} references unknown chain {}",
                    token.symbol,
                    token.chain_id
                ));
            }
            if !groups.insert((token.chain_id, token.group.to_uppercase())) {
                return Err(anyhow::anyhow!(
                    "Configuration error: more than one token in group '{}' on chain {}. Exactly one token per (chain, group) is allowed.",
                    token.group,
                    token.chain_id
                ));
            }
        }

        for gas in &self.gas_overrides {
            if !chain_ids.contains(&gas.chain_id) {
                return Err(anyhow::anyhow!(
                    "Configuration error: gas_override references unknown chain {}",
                    gas.chain_id
                ));
            }
            if let Some(buffer) = gas.buffer_percent {
                if buffer < MIN_BUFFER_PERCENT {
                    return Err(anyhow::anyhow!(
                        "Configuration error: gas_override for chain {} sets buffer_percent {}, below the minimum of {}",
                        gas.chain_id,
                        buffer,
                        MIN_BUFFER_PERCENT
                    ));
                }
            }
        }

        Ok(())
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from an explicit path.
    pub fn load_from(config_path: &str) -> anyhow::Result<Self> {
        if std::path::Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            Self::from_toml_str(&content)
        } else {
            // Configuration file doesn't exist - user needs to copy template
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/fill-relayer.template.toml config/fill-relayer.toml\n\
                Then edit config/fill-relayer.toml with your actual values.",
                config_path
            ))
        }
    }

    /// Loads configuration from `FILL_RELAYER_CONFIG_PATH` or the default path.
    pub fn load() -> anyhow::Result<Self> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&config_path)
    }

    pub fn gas_override(&self, chain_id: u64) -> Option<&GasOverrideConfig> {
        self.gas_overrides.iter().find(|o| o.chain_id == chain_id)
    }
}
