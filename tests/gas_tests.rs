//! Unit tests for the gas parameter engine against an in-memory chain

use ethereum_types::{H160, U256};
use fill_relayer::config::GasOverrideConfig;
use fill_relayer::gas::{FeeParams, GasEngine, GasRequest, GasTuning, Priority, TxType, MIN_BUFFER_PERCENT};
use fill_relayer::registry::{ChainClass, ChainProfile};

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{build_test_config, dest_chain, FakeChain, DEST_CHAIN_ID, ONE_GWEI, ORIGIN_CHAIN_ID};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn origin_chain() -> ChainProfile {
    let config = build_test_config();
    ChainProfile::from_config(config.chains.iter().find(|c| c.chain_id == ORIGIN_CHAIN_ID).unwrap())
}

fn request(chain: &ChainProfile, tx_type: TxType, estimated_gas: Option<u64>) -> GasRequest<'_> {
    GasRequest {
        chain,
        from: H160::from_low_u64_be(0x99),
        priority: Priority::Standard,
        tx_type,
        estimated_gas,
        token: None,
    }
}

// ============================================================================
// GAS LIMIT
// ============================================================================

/// What is tested: buffers never shrink a limit and grow from L1 to L2 to ZK
/// Why: Rollups under-estimate more; a smaller buffer there causes out-of-gas reverts
#[test]
fn test_buffer_grows_with_chain_class() {
    for tx_type in TxType::ALL {
        let base = 100_000;
        let l1 = GasTuning::for_class(ChainClass::L1).buffered_limit(base, tx_type);
        let l2 = GasTuning::for_class(ChainClass::L2).buffered_limit(base, tx_type);
        let zk = GasTuning::for_class(ChainClass::ZkRollup).buffered_limit(base, tx_type);
        assert!(base <= l1 && l1 <= l2 && l2 <= zk, "{:?}: {} {} {}", tx_type, l1, l2, zk);
    }
}

/// What is tested: a supplied estimate is buffered without asking the node
/// Why: The submitter passes its own classified estimate
#[tokio::test]
async fn test_supplied_estimate_is_buffered() {
    let chain = dest_chain();
    let rpc = FakeChain::new(DEST_CHAIN_ID);
    // Would be used if the engine estimated on its own
    rpc.push_estimate(Ok(1));

    let quote = GasEngine::default()
        .quote(&rpc, &request(&chain, TxType::ContractCall, Some(90_000)))
        .await
        .unwrap();
    assert_eq!(quote.gas_limit, 135_000);
}

/// What is tested: failed representative estimates fall back to the static table
/// Why: Quotes must always produce a limit
#[tokio::test]
async fn test_static_table_fallback() {
    let chain = dest_chain();
    let rpc = FakeChain::new(DEST_CHAIN_ID);
    rpc.push_estimate(Err(test_helpers::node_error("eth_estimateGas", "execution reverted")));

    let quote = GasEngine::default()
        .quote(&rpc, &request(&chain, TxType::EthTransfer, None))
        .await
        .unwrap();
    assert_eq!(quote.gas_limit, 31_500);

    // No representative call for arbitrary contract calls
    let quote = GasEngine::default()
        .quote(&rpc, &request(&chain, TxType::ContractCall, None))
        .await
        .unwrap();
    assert_eq!(quote.gas_limit, 375_000);
}

// ============================================================================
// FEES
// ============================================================================

/// What is tested: L2 EIP-1559 pricing derives the tip from the base fee
/// Why: L2 nodes return unusable eth_maxPriorityFeePerGas values
#[tokio::test]
async fn test_l2_eip1559_fees() {
    let chain = dest_chain();
    let rpc = FakeChain::new(DEST_CHAIN_ID);

    let quote = GasEngine::default()
        .quote(&rpc, &request(&chain, TxType::ContractCall, Some(90_000)))
        .await
        .unwrap();

    // tip = 1% of 1 gwei; max = 1.5 * base + tip
    assert_eq!(
        quote.fees,
        FeeParams::Eip1559 {
            max_fee_per_gas: U256::from(1_510_000_000u64),
            max_priority_fee_per_gas: U256::from(10_000_000u64),
        }
    );
    assert_eq!(quote.priority, Priority::Standard);
}

/// What is tested: L1 pricing uses the node tip and a 2x base fee headroom
/// Why: Base fee can double over a few blocks on L1
#[tokio::test]
async fn test_l1_eip1559_fees() {
    let chain = origin_chain();
    let rpc = FakeChain::new(ORIGIN_CHAIN_ID);

    let quote = GasEngine::default()
        .quote(&rpc, &request(&chain, TxType::ContractCall, Some(100_000)))
        .await
        .unwrap();

    assert_eq!(quote.gas_limit, 130_000);
    assert_eq!(
        quote.fees,
        FeeParams::Eip1559 {
            max_fee_per_gas: U256::from(2 * ONE_GWEI + ONE_GWEI / 10),
            max_priority_fee_per_gas: U256::from(ONE_GWEI / 10),
        }
    );
}

/// What is tested: missing baseFeePerGas falls back to legacy pricing
/// Why: Chains flagged as EIP-1559 sometimes serve pre-London headers
#[tokio::test]
async fn test_legacy_fallback_without_base_fee() {
    let chain = dest_chain();
    let rpc = FakeChain::new(DEST_CHAIN_ID);
    rpc.set_legacy();

    let quote = GasEngine::default()
        .quote(&rpc, &request(&chain, TxType::ContractCall, Some(90_000)))
        .await
        .unwrap();

    // 2 gwei network price * 1.5 standard multiplier
    assert_eq!(quote.fees, FeeParams::Legacy { gas_price: U256::from(3 * ONE_GWEI) });
}

/// What is tested: a configured override replaces the base fee multiplier
/// Why: Operators tune misbehaving chains without a release
#[tokio::test]
async fn test_override_applies_to_quote() {
    let chain = dest_chain();
    let rpc = FakeChain::new(DEST_CHAIN_ID);
    let engine = GasEngine::new(&[GasOverrideConfig {
        chain_id: DEST_CHAIN_ID,
        base_fee_multiplier_percent: Some(300),
        ..Default::default()
    }]);

    let quote = engine.quote(&rpc, &request(&chain, TxType::ContractCall, Some(90_000))).await.unwrap();
    assert_eq!(quote.fees.max_price_per_gas(), U256::from(3_010_000_000u64));

    // Other chains keep their defaults
    assert_eq!(engine.tuning(&origin_chain()), GasTuning::for_chain(ORIGIN_CHAIN_ID, ChainClass::L1));
}

/// What is tested: a buffer override below 130% is rejected at load and floored in the engine
/// Why: Buffers under x1.3 reintroduce the out-of-gas reverts the buffer exists to prevent
#[tokio::test]
async fn test_low_buffer_override_is_rejected() {
    let low = GasOverrideConfig { chain_id: DEST_CHAIN_ID, buffer_percent: Some(110), ..Default::default() };

    let mut config = build_test_config();
    config.gas_overrides = vec![low.clone()];
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("buffer_percent 110"), "{}", err);

    config.gas_overrides[0].buffer_percent = Some(MIN_BUFFER_PERCENT);
    assert!(config.validate().is_ok());

    // An unvalidated override still cannot shrink the buffer below the floor
    let chain = dest_chain();
    let rpc = FakeChain::new(DEST_CHAIN_ID);
    let quote = GasEngine::new(&[low])
        .quote(&rpc, &request(&chain, TxType::ContractCall, Some(100_000)))
        .await
        .unwrap();
    assert_eq!(quote.gas_limit, 130_000);
}
