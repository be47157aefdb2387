//! Gas Parameter Engine
//!
//! Computes a complete fee parameter set and a buffered gas limit for one
//! submission attempt. Per call the engine reads the latest block, escalates
//! the priority tier under congestion, settles the base gas amount (supplied
//! estimate, live estimate of a representative transaction, or the static
//! table), and prices it on the EIP-1559 or legacy path.
//!
//! The engine never returns "no fee". Fee-too-low outcomes are handled by the
//! submitter's broadcast error path.

pub mod tuning;

use std::collections::HashMap;

use ethereum_types::{H160, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::{encode_erc20_approve, encode_erc20_transfer};
use crate::config::GasOverrideConfig;
use crate::error::RelayError;
use crate::evm_client::{BlockHeader, CallRequest, EvmRpc};
use crate::registry::ChainProfile;

pub use tuning::{GasTuning, MIN_BUFFER_PERCENT};
use tuning::scale_percent;

// ============================================================================
// TYPES
// ============================================================================

/// Fee tier requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Slow,
    #[default]
    Standard,
    Fast,
}

impl Priority {
    pub fn index(&self) -> usize {
        match self {
            Priority::Slow => 0,
            Priority::Standard => 1,
            Priority::Fast => 2,
        }
    }
}

/// Transaction shape, used to pick static limits and buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxType {
    EthTransfer,
    Erc20Transfer,
    Erc20Approve,
    ContractCall,
}

impl TxType {
    pub const ALL: [TxType; 4] =
        [TxType::EthTransfer, TxType::Erc20Transfer, TxType::Erc20Approve, TxType::ContractCall];

    pub fn index(&self) -> usize {
        match self {
            TxType::EthTransfer => 0,
            TxType::Erc20Transfer => 1,
            TxType::Erc20Approve => 2,
            TxType::ContractCall => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeParams {
    Legacy {
        gas_price: U256,
    },
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

impl FeeParams {
    /// Worst-case price per gas unit.
    pub fn max_price_per_gas(&self) -> U256 {
        match self {
            FeeParams::Legacy { gas_price } => *gas_price,
            FeeParams::Eip1559 { max_fee_per_gas, .. } => *max_fee_per_gas,
        }
    }

    /// Scales every fee field by `percent`.
    pub fn bumped(&self, percent: u32) -> Self {
        match *self {
            FeeParams::Legacy { gas_price } => FeeParams::Legacy { gas_price: scale_percent(gas_price, percent) },
            FeeParams::Eip1559 { max_fee_per_gas, max_priority_fee_per_gas } => FeeParams::Eip1559 {
                max_fee_per_gas: scale_percent(max_fee_per_gas, percent),
                max_priority_fee_per_gas: scale_percent(max_priority_fee_per_gas, percent),
            },
        }
    }

    /// Copies the fee fields onto a call request (for simulation).
    pub fn apply_to(&self, call: &mut CallRequest) {
        match *self {
            FeeParams::Legacy { gas_price } => call.gas_price = Some(gas_price),
            FeeParams::Eip1559 { max_fee_per_gas, max_priority_fee_per_gas } => {
                call.max_fee_per_gas = Some(max_fee_per_gas);
                call.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
            }
        }
    }
}

/// Engine output: limit and fees, without sender or nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasQuote {
    pub gas_limit: u64,
    pub fees: FeeParams,
    /// Tier after congestion escalation
    pub priority: Priority,
}

/// Everything needed to sign one attempt. Produced fresh per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPlan {
    pub from: H160,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fees: FeeParams,
}

impl GasPlan {
    pub fn new(from: H160, nonce: u64, quote: GasQuote) -> Self {
        Self { from, nonce, gas_limit: quote.gas_limit, fees: quote.fees }
    }
}

/// Input to [`GasEngine::quote`].
#[derive(Debug, Clone)]
pub struct GasRequest<'a> {
    pub chain: &'a ChainProfile,
    pub from: H160,
    pub priority: Priority,
    pub tx_type: TxType,
    /// Pre-computed estimate; skips live estimation when set
    pub estimated_gas: Option<u64>,
    /// Token used for the representative ERC-20 estimate
    pub token: Option<H160>,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Stateless apart from per-chain tuning overrides loaded at start-up.
#[derive(Debug, Clone, Default)]
pub struct GasEngine {
    overrides: HashMap<u64, GasOverrideConfig>,
}

impl GasEngine {
    pub fn new(overrides: &[GasOverrideConfig]) -> Self {
        Self { overrides: overrides.iter().map(|o| (o.chain_id, o.clone())).collect() }
    }

    /// Effective tuning for a chain: class defaults, chain adjustments, overrides.
    pub fn tuning(&self, chain: &ChainProfile) -> GasTuning {
        let tuning = GasTuning::for_chain(chain.chain_id, chain.class);
        match self.overrides.get(&chain.chain_id) {
            Some(config) => tuning.with_override(config),
            None => tuning,
        }
    }

    /// Computes gas limit and fees for one attempt.
    ///
    /// # Returns
    ///
    /// * `Ok(GasQuote)` - Complete parameter set
    /// * `Err(RelayError::Rpc)` - Neither block data nor a gas price could be read
    pub async fn quote(&self, rpc: &dyn EvmRpc, request: &GasRequest<'_>) -> Result<GasQuote, RelayError> {
        let chain = request.chain;
        let tuning = self.tuning(chain);

        let block = match rpc.latest_block().await {
            Ok(block) => Some(block),
            Err(e) => {
                warn!("Chain {}: latest block unavailable ({}), pricing without it", chain.chain_id, e);
                None
            }
        };

        let priority = escalate_priority(request.priority, block.as_ref());
        if priority != request.priority {
            info!(
                "Chain {}: block utilisation above 90%, escalating {:?} to {:?}",
                chain.chain_id, request.priority, priority
            );
        }

        let base_gas = match request.estimated_gas {
            Some(estimate) => estimate,
            None => self.live_or_static_estimate(rpc, request, &tuning).await,
        };
        let gas_limit = tuning.buffered_limit(base_gas, request.tx_type);

        let base_fee = block.as_ref().and_then(|b| b.base_fee_per_gas);
        let fees = match (chain.is_eip1559, base_fee) {
            (true, Some(base_fee)) => eip1559_fees(rpc, chain, &tuning, base_fee, priority).await,
            (true, None) => {
                warn!(
                    "Chain {} is flagged EIP-1559 but the latest block has no baseFeePerGas; using legacy pricing",
                    chain.chain_id
                );
                legacy_fees(rpc, &tuning, priority).await?
            }
            (false, _) => legacy_fees(rpc, &tuning, priority).await?,
        };

        debug!(
            "Chain {}: gas quote base={} limit={} fees={:?} priority={:?}",
            chain.chain_id, base_gas, gas_limit, fees, priority
        );
        Ok(GasQuote { gas_limit, fees, priority })
    }

    async fn live_or_static_estimate(
        &self,
        rpc: &dyn EvmRpc,
        request: &GasRequest<'_>,
        tuning: &GasTuning,
    ) -> u64 {
        if let Some(call) = representative_call(request.tx_type, request.from, request.token) {
            match rpc.estimate_gas(&call).await {
                Ok(estimate) => return estimate,
                Err(e) => debug!(
                    "Chain {}: representative {:?} estimate failed ({}), using static table",
                    request.chain.chain_id, request.tx_type, e
                ),
            }
        }
        tuning.static_limit(request.tx_type)
    }
}

/// Upgrades `standard` to `fast` when the latest block is congested.
pub fn escalate_priority(priority: Priority, block: Option<&BlockHeader>) -> Priority {
    match (priority, block) {
        (Priority::Standard, Some(block)) if block.is_congested() => Priority::Fast,
        _ => priority,
    }
}

/// A synthetic transaction whose estimate stands in for the real one.
fn representative_call(tx_type: TxType, from: H160, token: Option<H160>) -> Option<CallRequest> {
    let base = CallRequest { from: Some(from), ..Default::default() };
    match (tx_type, token) {
        (TxType::EthTransfer, _) => Some(CallRequest { to: Some(from), value: Some(U256::zero()), ..base }),
        (TxType::Erc20Transfer, Some(token)) => Some(CallRequest {
            to: Some(token),
            data: Some(encode_erc20_transfer(from, U256::zero())),
            ..base
        }),
        (TxType::Erc20Approve, Some(token)) => Some(CallRequest {
            to: Some(token),
            data: Some(encode_erc20_approve(from, U256::zero())),
            ..base
        }),
        _ => None,
    }
}

async fn eip1559_fees(
    rpc: &dyn EvmRpc,
    chain: &ChainProfile,
    tuning: &GasTuning,
    base_fee: U256,
    priority: Priority,
) -> FeeParams {
    let suggested = match tuning.priority_fee_percent_of_base {
        Some(percent) => scale_percent(base_fee, percent),
        None => match rpc.max_priority_fee_per_gas().await {
            Ok(fee) => fee,
            Err(e) => {
                warn!(
                    "Chain {}: eth_maxPriorityFeePerGas unavailable ({}), deriving from base fee",
                    chain.chain_id, e
                );
                scale_percent(base_fee, tuning.fallback_priority_percent_of_base)
            }
        },
    };

    let priority_fee = scale_percent(suggested, tuning.priority_tier(priority))
        .max(tuning.min_priority_fee)
        .max(U256::one());
    let max_fee = scale_percent(base_fee, tuning.base_fee_multiplier_percent).saturating_add(priority_fee);

    FeeParams::Eip1559 { max_fee_per_gas: max_fee, max_priority_fee_per_gas: priority_fee }
}

async fn legacy_fees(rpc: &dyn EvmRpc, tuning: &GasTuning, priority: Priority) -> Result<FeeParams, RelayError> {
    let network_price = rpc.gas_price().await?;
    let gas_price = scale_percent(network_price, tuning.legacy_multiplier(priority))
        .max(tuning.min_gas_price)
        .max(U256::one());
    Ok(FeeParams::Legacy { gas_price })
}
