//! Fill relayer library
//!
//! Decodes deposits observed on a source chain and fills them on the
//! destination EVM chain, guarding against double fills, nonce collisions and
//! gas estimation failures.

pub mod abi;
pub mod amount;
pub mod api;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod dedup;
pub mod error;
pub mod evm_client;
pub mod gas;
pub mod nonce;
pub mod orchestrator;
pub mod persistence;
pub mod registry;
pub mod relay_state;
pub mod retry;
pub mod store;
pub mod submitter;
pub mod tx;

// Re-export public types for convenience
pub use codec::{DecodedCall, DepositRecord, FillRecord};
pub use config::Config;
pub use crypto::VaultSigner;
pub use error::{ErrorKind, RelayError};
pub use evm_client::{EvmClient, EvmRpc, RpcError};
pub use orchestrator::{ChainClients, DepositEvent, FillOrchestrator, FillOutcome, OriginChain};
pub use registry::{ChainProfile, Registry, StaticRegistry, TokenProfile};
pub use submitter::{SubmitOutcome, Submitter};
