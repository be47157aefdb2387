//! Chain and token registry
//!
//! Read-only lookup of chain and token metadata. The relayer consumes it
//! through the [`Registry`] trait; [`StaticRegistry`] builds the tables once
//! from configuration at process start and is injected where needed.
//!
//! Chain characteristics (`is_l2`, `is_eip1559`, POA, chain class) come from
//! static allow/deny-lists, optionally overridden per chain in configuration.
//! They are never detected per call.

use std::collections::HashMap;

use ethereum_types::H160;

use crate::config::{ChainConfig, Config, TokenConfig};
use crate::error::RelayError;

/// Chains treated as L1 for gas purposes (Ethereum, BSC, Linea; mainnet and testnet).
pub const L1_CHAIN_IDS: &[u64] = &[1, 11155111, 56, 97, 59144, 59141];

/// ZK rollups: zkSync Era, Polygon zkEVM, Scroll (mainnet and testnet).
pub const ZK_ROLLUP_CHAIN_IDS: &[u64] = &[324, 300, 1101, 2442, 534352, 534351];

/// Chains that reject or mis-handle type-2 transactions: Polygon zkEVM Cardona, Metis.
pub const NON_EIP1559_CHAIN_IDS: &[u64] = &[2442, 1088, 59902];

/// Proof-of-authority chains with extended `extraData` block headers.
pub const POA_CHAIN_IDS: &[u64] = &[56, 97, 80002];

/// Gas behaviour class of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainClass {
    L1,
    L2,
    ZkRollup,
}

impl ChainClass {
    pub fn for_chain(chain_id: u64, is_l2: bool) -> Self {
        if !is_l2 {
            ChainClass::L1
        } else if ZK_ROLLUP_CHAIN_IDS.contains(&chain_id) {
            ChainClass::ZkRollup
        } else {
            ChainClass::L2
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainProfile {
    pub chain_id: u64,
    pub name: String,
    /// Webhook provider network name
    pub network: String,
    pub rpc_url: String,
    pub deposit_contract: H160,
    pub fill_relay_contract: Option<H160>,
    pub is_l2: bool,
    pub is_eip1559: bool,
    pub is_mainnet: bool,
    pub is_poa: bool,
    pub class: ChainClass,
}

impl ChainProfile {
    pub fn from_config(config: &ChainConfig) -> Self {
        let chain_id = config.chain_id;
        let is_l2 = config.is_l2.unwrap_or(!L1_CHAIN_IDS.contains(&chain_id));
        Self {
            chain_id,
            name: config.name.clone(),
            network: config.network.clone(),
            rpc_url: config.rpc_url.clone(),
            deposit_contract: config.deposit_contract,
            fill_relay_contract: config.fill_relay_contract,
            is_l2,
            is_eip1559: config.is_eip1559.unwrap_or(!NON_EIP1559_CHAIN_IDS.contains(&chain_id)),
            is_mainnet: config.is_mainnet,
            is_poa: config.is_poa.unwrap_or(POA_CHAIN_IDS.contains(&chain_id)),
            class: ChainClass::for_chain(chain_id, is_l2),
        }
    }

    /// Fill contract address, required for destination chains.
    pub fn fill_contract(&self) -> Result<H160, RelayError> {
        self.fill_relay_contract.ok_or(RelayError::MissingFillContract(self.chain_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenProfile {
    pub chain_id: u64,
    pub symbol: String,
    pub group: String,
    /// Zero address for the native coin
    pub address: H160,
    pub decimals: u8,
}

impl TokenProfile {
    pub fn is_native(&self) -> bool {
        self.address.is_zero()
    }
}

impl From<&TokenConfig> for TokenProfile {
    fn from(config: &TokenConfig) -> Self {
        Self {
            chain_id: config.chain_id,
            symbol: config.symbol.clone(),
            group: config.group.clone(),
            address: config.address,
            decimals: config.decimals,
        }
    }
}

/// How a token is looked up on a chain.
#[derive(Debug, Clone, Copy)]
pub enum TokenQuery<'a> {
    Symbol(&'a str),
    Address(H160),
    Group(&'a str),
}

impl std::fmt::Display for TokenQuery<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenQuery::Symbol(symbol) => write!(f, "symbol {}", symbol),
            TokenQuery::Address(address) => write!(f, "address {:?}", address),
            TokenQuery::Group(group) => write!(f, "group {}", group),
        }
    }
}

/// Read-only chain/token catalog.
pub trait Registry: Send + Sync {
    fn chain_by_id(&self, chain_id: u64) -> Result<ChainProfile, RelayError>;

    /// Lookup by webhook provider network name (case-insensitive).
    fn chain_by_network(&self, network: &str) -> Result<ChainProfile, RelayError>;

    /// Symbol and group lookups fail on ambiguity instead of picking one.
    fn token(&self, chain_id: u64, query: TokenQuery<'_>) -> Result<TokenProfile, RelayError>;
}

/// Registry backed by in-memory tables built from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    chains: HashMap<u64, ChainProfile>,
    tokens: Vec<TokenProfile>,
}

impl StaticRegistry {
    pub fn new(chains: Vec<ChainProfile>, tokens: Vec<TokenProfile>) -> Self {
        Self {
            chains: chains.into_iter().map(|c| (c.chain_id, c)).collect(),
            tokens,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.chains.iter().map(ChainProfile::from_config).collect(),
            config.tokens.iter().map(TokenProfile::from).collect(),
        )
    }

    pub fn chains(&self) -> impl Iterator<Item = &ChainProfile> {
        self.chains.values()
    }

    fn unique_token<'a>(
        &self,
        chain_id: u64,
        label: &str,
        mut matches: impl Iterator<Item = &'a TokenProfile>,
    ) -> Result<TokenProfile, RelayError> {
        let first = matches.next().ok_or_else(|| {
            RelayError::TokenNotFound(format!("{} on chain {}", label, chain_id))
        })?;
        let extra = matches.count();
        if extra > 0 {
            return Err(RelayError::AmbiguousToken {
                chain_id,
                group: label.to_string(),
                count: extra + 1,
            });
        }
        Ok(first.clone())
    }
}

impl Registry for StaticRegistry {
    fn chain_by_id(&self, chain_id: u64) -> Result<ChainProfile, RelayError> {
        self.chains
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| RelayError::ChainNotFound(format!("chain id {}", chain_id)))
    }

    fn chain_by_network(&self, network: &str) -> Result<ChainProfile, RelayError> {
        self.chains
            .values()
            .find(|c| c.network.eq_ignore_ascii_case(network))
            .cloned()
            .ok_or_else(|| RelayError::ChainNotFound(format!("network {}", network)))
    }

    fn token(&self, chain_id: u64, query: TokenQuery<'_>) -> Result<TokenProfile, RelayError> {
        let on_chain = self.tokens.iter().filter(move |t| t.chain_id == chain_id);
        match query {
            TokenQuery::Address(address) => self.unique_token(
                chain_id,
                &format!("{:?}", address),
                on_chain.filter(move |t| t.address == address),
            ),
            TokenQuery::Symbol(symbol) => self.unique_token(
                chain_id,
                symbol,
                on_chain.filter(move |t| t.symbol.eq_ignore_ascii_case(symbol)),
            ),
            TokenQuery::Group(group) => self.unique_token(
                chain_id,
                group,
                on_chain.filter(move |t| t.group.eq_ignore_ascii_case(group)),
            ),
        }
    }
}
