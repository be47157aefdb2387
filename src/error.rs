//! Error taxonomy for the relay pipeline
//!
//! Every failure the pipeline can surface is a [`RelayError`] variant. Each
//! variant is classified as fatal (abort, do not retry this deposit) or
//! retryable (a transient condition that outlived its internal time budget).
//! Non-error exits such as "already filled" and "duplicate" are outcomes, not
//! errors, and live with the submitter and orchestrator.

use ethereum_types::{H160, H256};
use thiserror::Error;

use crate::abi::DecodeError;
use crate::evm_client::RpcError;

/// Broad classification used for operator alerting and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fatal,
    Retryable,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Fatal => write!(f, "fatal"),
            ErrorKind::Retryable => write!(f, "retryable"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed calldata: {0}")]
    Decode(#[from] DecodeError),
    #[error("calldata is not a deposit call (selector {0})")]
    UnexpectedCall(String),
    #[error("deposit recipient is not a valid EVM address")]
    InvalidRecipient,
    #[error("vault {0:?} is not in the authorized vault list")]
    UnauthorizedVault(H160),
    #[error(
        "network mismatch: origin chain {origin} (mainnet={origin_mainnet}) cannot fill on \
         destination chain {destination} (mainnet={destination_mainnet})"
    )]
    NetworkMismatch {
        origin: u64,
        origin_mainnet: bool,
        destination: u64,
        destination_mainnet: bool,
    },
    #[error("chain not found: {0}")]
    ChainNotFound(String),
    #[error("token not found: {0}")]
    TokenNotFound(String),
    #[error("ambiguous token mapping: {count} tokens in group '{group}' on chain {chain_id}")]
    AmbiguousToken {
        chain_id: u64,
        group: String,
        count: usize,
    },
    #[error("chain {0} has no fill relay contract configured")]
    MissingFillContract(u64),
    #[error("amount computation failed: {0}")]
    Amount(String),
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),
    #[error("insufficient ERC-20 allowance: {0}")]
    InsufficientAllowance(String),
    #[error("no contract code at {address:?} on chain {chain_id}")]
    NoContractCode { chain_id: u64, address: H160 },
    #[error("contract reverted with {name}: {detail}")]
    ContractError { name: String, detail: String },
    #[error("simulation failed: {0}")]
    SimulationFailed(String),
    #[error("replacement transaction underpriced at nonce {nonce}: {message}")]
    ReplacementUnderpriced { nonce: u64, message: String },
    #[error("broadcast rejected at nonce {nonce}: {message}")]
    BroadcastFailed { nonce: u64, message: String },
    #[error("transaction {tx_hash:?} reverted on chain")]
    Reverted { tx_hash: H256 },
    #[error("pending transactions for {address:?} on chain {chain_id} did not clear within {waited_secs}s")]
    PendingTimeout {
        chain_id: u64,
        address: H160,
        waited_secs: u64,
    },
    #[error("already-known transaction at nonce {nonce} was not confirmed within {waited_secs}s")]
    AlreadyKnownTimeout { nonce: u64, waited_secs: u64 },
    #[error("nonce lock '{0}' could not be acquired")]
    NonceLockUnavailable(String),
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("key-value store error: {0}")]
    Store(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl RelayError {
    /// Fatal errors must not be retried for the same deposit.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::PendingTimeout { .. }
            | RelayError::AlreadyKnownTimeout { .. }
            | RelayError::NonceLockUnavailable(_)
            | RelayError::Rpc(_)
            | RelayError::Store(_)
            | RelayError::Persistence(_) => ErrorKind::Retryable,
            _ => ErrorKind::Fatal,
        }
    }

    /// Decoded on-chain error name, when the failure came from a revert.
    pub fn contract_error_name(&self) -> Option<&str> {
        match self {
            RelayError::ContractError { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Operator-facing reason string: `<kind>: <message>`.
    pub fn reason(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

// ============================================================================
// NODE MESSAGE CLASSIFIERS
// ============================================================================
//
// Nodes report estimation/broadcast failures as free text. These helpers map
// the messages seen across geth, erigon, nethermind, zkSync and BSC nodes.

/// Gas estimation or simulation ran out of gas.
pub fn is_out_of_gas(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("out of gas")
        || lower.contains("gas required exceeds")
        || lower.contains("intrinsic gas too low")
}

/// Sender cannot cover value + fees, or a token balance is too low.
pub fn is_insufficient_funds(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("insufficient funds") || lower.contains("insufficient balance")
}

/// ERC-20 transferFrom rejected for lack of allowance.
pub fn is_allowance_failure(message: &str) -> bool {
    if is_out_of_gas(message) {
        return false;
    }
    let lower = message.to_lowercase();
    lower.contains("safeerc20")
        || lower.contains("low-level call failed")
        || lower.contains("exceeds allowance")
        || lower.contains("insufficient allowance")
}

/// The exact transaction is already in the node's mempool.
pub fn is_already_known(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("already known") || lower.contains("known transaction")
}

pub fn is_replacement_underpriced(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("replacement transaction underpriced") || lower.contains("replacement fee too low")
}

/// Extracts the gas amount from messages like
/// `gas required exceeds allowance (123456)` or `gas required exceeds: 123456`.
pub fn required_gas_hint(message: &str) -> Option<u64> {
    let lower = message.to_lowercase();
    let start = lower.find("gas required exceeds")?;
    lower[start..]
        .split(|c: char| !c.is_ascii_digit())
        .find(|part| !part.is_empty())
        .and_then(|digits| digits.parse().ok())
}
