//! Gas tuning constants
//!
//! Defaults per chain class, chain-specific adjustments for chains known to
//! under-estimate or reject low prices, and operator overrides from config.
//! Percentages are integers: 130 means x1.3.

use ethereum_types::U256;

use super::{Priority, TxType};
use crate::config::GasOverrideConfig;
use crate::registry::ChainClass;

const GWEI: u64 = 1_000_000_000;

/// Smallest gas limit buffer accepted from defaults or overrides (x1.3).
pub const MIN_BUFFER_PERCENT: u32 = 130;

const ARBITRUM_CHAIN_IDS: &[u64] = &[42161, 421614];
const BSC_CHAIN_IDS: &[u64] = &[56, 97];
const POLYGON_CHAIN_IDS: &[u64] = &[137, 80002];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasTuning {
    /// Fallback gas limits indexed by [`TxType::index`]
    pub static_limits: [u64; 4],
    /// Gas limit buffer per [`TxType::index`], in percent
    pub buffer_percent: [u32; 4],
    /// `k` in `max_fee = base_fee * k + priority_fee`
    pub base_fee_multiplier_percent: u32,
    /// Priority fee as a share of base fee; `None` asks the node (L1)
    pub priority_fee_percent_of_base: Option<u32>,
    /// Used on L1 when `eth_maxPriorityFeePerGas` is unavailable
    pub fallback_priority_percent_of_base: u32,
    /// Priority fee tier scaling per [`Priority::index`]
    pub priority_tier_percent: [u32; 3],
    /// Legacy gas price scaling per [`Priority::index`]
    pub legacy_multipliers_percent: [u32; 3],
    pub min_gas_price: U256,
    pub min_priority_fee: U256,
}

impl GasTuning {
    /// Class defaults without chain-specific adjustments.
    pub fn for_class(class: ChainClass) -> Self {
        let tiers = [80, 100, 150];
        match class {
            ChainClass::L1 => Self {
                static_limits: [21_000, 65_000, 50_000, 200_000],
                buffer_percent: [130; 4],
                base_fee_multiplier_percent: 200,
                priority_fee_percent_of_base: None,
                fallback_priority_percent_of_base: 5,
                priority_tier_percent: tiers,
                legacy_multipliers_percent: [100, 110, 125],
                min_gas_price: U256::one(),
                min_priority_fee: U256::one(),
            },
            ChainClass::L2 => Self {
                static_limits: [21_000, 80_000, 60_000, 250_000],
                buffer_percent: [150; 4],
                base_fee_multiplier_percent: 150,
                priority_fee_percent_of_base: Some(1),
                fallback_priority_percent_of_base: 1,
                priority_tier_percent: tiers,
                legacy_multipliers_percent: [120, 150, 200],
                min_gas_price: U256::one(),
                min_priority_fee: U256::one(),
            },
            ChainClass::ZkRollup => Self {
                static_limits: [150_000, 300_000, 250_000, 800_000],
                buffer_percent: [300, 300, 300, 400],
                base_fee_multiplier_percent: 150,
                priority_fee_percent_of_base: Some(2),
                fallback_priority_percent_of_base: 2,
                priority_tier_percent: tiers,
                legacy_multipliers_percent: [120, 150, 200],
                min_gas_price: U256::one(),
                min_priority_fee: U256::one(),
            },
        }
    }

    /// Class defaults plus the built-in chain-specific adjustments.
    pub fn for_chain(chain_id: u64, class: ChainClass) -> Self {
        let mut tuning = Self::for_class(class);
        let approve = TxType::Erc20Approve.index();

        if ARBITRUM_CHAIN_IDS.contains(&chain_id) || BSC_CHAIN_IDS.contains(&chain_id) {
            tuning.buffer_percent[approve] = tuning.buffer_percent[approve].max(250);
        }
        if BSC_CHAIN_IDS.contains(&chain_id) {
            tuning.min_gas_price = U256::from(GWEI / 10);
        }
        if POLYGON_CHAIN_IDS.contains(&chain_id) {
            tuning.min_gas_price = U256::from(25 * GWEI);
            tuning.min_priority_fee = U256::from(25 * GWEI);
        }
        tuning
    }

    /// Applies operator overrides on top of the current values.
    pub fn with_override(mut self, config: &GasOverrideConfig) -> Self {
        if let Some(buffer) = config.buffer_percent {
            self.buffer_percent = [buffer; 4];
        }
        if let Some(k) = config.base_fee_multiplier_percent {
            self.base_fee_multiplier_percent = k;
        }
        if let Some(percent) = config.priority_fee_percent_of_base {
            self.priority_fee_percent_of_base = Some(percent);
        }
        if let Some(multipliers) = config.legacy_multipliers_percent {
            self.legacy_multipliers_percent = multipliers;
        }
        if let Some(min) = config.min_gas_price_wei {
            self.min_gas_price = U256::from(min);
        }
        if let Some(min) = config.min_priority_fee_wei {
            self.min_priority_fee = U256::from(min);
        }
        self
    }

    pub fn static_limit(&self, tx_type: TxType) -> u64 {
        self.static_limits[tx_type.index()]
    }

    /// `round(base * buffer)` with the buffer floored at [`MIN_BUFFER_PERCENT`].
    pub fn buffered_limit(&self, base: u64, tx_type: TxType) -> u64 {
        let percent = self.buffer_percent[tx_type.index()].max(MIN_BUFFER_PERCENT) as u128;
        let scaled = (base as u128 * percent + 50) / 100;
        scaled.min(u64::MAX as u128) as u64
    }

    pub fn legacy_multiplier(&self, priority: Priority) -> u32 {
        self.legacy_multipliers_percent[priority.index()]
    }

    pub fn priority_tier(&self, priority: Priority) -> u32 {
        self.priority_tier_percent[priority.index()]
    }
}

/// `value * percent / 100`, rounded down.
pub fn scale_percent(value: U256, percent: u32) -> U256 {
    value.saturating_mul(U256::from(percent)) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_specific_approve_buffer() {
        let arbitrum = GasTuning::for_chain(42161, ChainClass::L2);
        let base = GasTuning::for_chain(8453, ChainClass::L2);
        assert_eq!(arbitrum.buffered_limit(100_000, TxType::Erc20Approve), 250_000);
        assert_eq!(base.buffered_limit(100_000, TxType::Erc20Approve), 150_000);
    }

    #[test]
    fn test_override_replaces_defaults() {
        let tuning = GasTuning::for_chain(1, ChainClass::L1).with_override(&GasOverrideConfig {
            chain_id: 1,
            buffer_percent: Some(180),
            min_gas_price_wei: Some(7),
            ..Default::default()
        });
        assert_eq!(tuning.buffered_limit(10_000, TxType::ContractCall), 18_000);
        assert_eq!(tuning.min_gas_price, U256::from(7));
    }

    #[test]
    fn test_buffer_floor_survives_low_override() {
        let tuning = GasTuning::for_chain(8453, ChainClass::L2).with_override(&GasOverrideConfig {
            chain_id: 8453,
            buffer_percent: Some(110),
            ..Default::default()
        });
        assert_eq!(tuning.buffered_limit(100_000, TxType::EthTransfer), 130_000);
    }

    #[test]
    fn test_polygon_floors() {
        let tuning = GasTuning::for_chain(80002, ChainClass::L2);
        assert_eq!(tuning.min_priority_fee, U256::from(25 * GWEI));
    }
}
