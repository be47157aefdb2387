//! Relay State Checker
//!
//! Queries `isRelayFilled(originChainId, depositHash, recipient, outputToken)`
//! on the destination fill contract. Chain state is always re-read; results
//! are never cached because a competing relayer can fill at any time.

use ethereum_types::{H160, H256};
use tracing::{debug, warn};

use crate::codec::{decode_bool_return, encode_is_relay_filled};
use crate::error::RelayError;
use crate::evm_client::{CallRequest, EvmRpc};

/// Identifies one relay on the destination contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayKey {
    pub origin_chain_id: u64,
    pub deposit_hash: H256,
    pub recipient: H160,
    pub output_token: H160,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStatus {
    Filled,
    NotFilled,
    /// The view could not be read; carries the reason
    Unknown(String),
}

/// Where in the submission flow a check ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    BeforeParams,
    AfterPendingWait,
    /// Simulation reverted with `RelayAlreadyFilled`
    Simulation,
    BeforeBroadcast,
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Checkpoint::BeforeParams => write!(f, "before-params"),
            Checkpoint::AfterPendingWait => write!(f, "after-pending-wait"),
            Checkpoint::Simulation => write!(f, "simulation"),
            Checkpoint::BeforeBroadcast => write!(f, "before-broadcast"),
        }
    }
}

/// Checks the fill status of `key` on `fill_contract`.
///
/// # Returns
///
/// * `Ok(RelayStatus)` - `Unknown` when the RPC call or its decoding failed
/// * `Err(RelayError::NoContractCode)` - Nothing deployed at `fill_contract`
pub async fn is_filled(
    rpc: &dyn EvmRpc,
    chain_id: u64,
    fill_contract: H160,
    key: &RelayKey,
) -> Result<RelayStatus, RelayError> {
    match rpc.code_at(fill_contract).await {
        Ok(code) if code.is_empty() => {
            return Err(RelayError::NoContractCode { chain_id, address: fill_contract });
        }
        Ok(_) => {}
        Err(e) => return Ok(RelayStatus::Unknown(format!("eth_getCode failed: {}", e))),
    }

    let call = CallRequest {
        to: Some(fill_contract),
        data: Some(encode_is_relay_filled(key.origin_chain_id, key.deposit_hash, key.recipient, key.output_token)),
        ..Default::default()
    };

    let status = match rpc.call(&call).await {
        Ok(data) => match decode_bool_return(&data) {
            Ok(true) => RelayStatus::Filled,
            Ok(false) => RelayStatus::NotFilled,
            Err(e) => RelayStatus::Unknown(format!("undecodable isRelayFilled result: {}", e)),
        },
        Err(e) => RelayStatus::Unknown(format!("isRelayFilled call failed: {}", e)),
    };

    match &status {
        RelayStatus::Unknown(reason) => warn!("Chain {}: relay {:?} state unknown: {}", chain_id, key.deposit_hash, reason),
        other => debug!("Chain {}: relay {:?} is {:?}", chain_id, key.deposit_hash, other),
    }
    Ok(status)
}
