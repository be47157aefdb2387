//! Shared test helpers for fill relayer tests
//!
//! Constants, configuration builders and [`FakeChain`], an in-memory EVM node
//! implementing `EvmRpc` whose nonce counts, relay state and error responses
//! are scripted by each test.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethereum_types::{H160, H256, U256};
use serde_json::Value;

use fill_relayer::abi::{keccak256, selector};
use fill_relayer::codec::{self, DepositRecord, IS_RELAY_FILLED_SIGNATURE};
use fill_relayer::config::{ChainConfig, Config, ServiceConfig, TokenConfig};
use fill_relayer::crypto::VaultSigner;
use fill_relayer::dedup::IdempotencyGuard;
use fill_relayer::evm_client::{BlockHeader, BlockTag, CallRequest, EvmRpc, Receipt, RpcError};
use fill_relayer::gas::{GasEngine, Priority, TxType};
use fill_relayer::nonce::NonceCoordinator;
use fill_relayer::orchestrator::{ChainClients, FillOrchestrator, OrchestratorSettings};
use fill_relayer::persistence::MemoryTxLineStore;
use fill_relayer::registry::{ChainProfile, StaticRegistry};
use fill_relayer::relay_state::RelayKey;
use fill_relayer::submitter::{RelayGuard, SubmitRequest, Submitter, SubmitterSettings};

// ============================================================================
// CONSTANTS
// ============================================================================

// -------------------------------- CHAINS --------------------------------

/// Origin chain (Ethereum Sepolia)
pub const ORIGIN_CHAIN_ID: u64 = 11155111;

/// Destination chain (Base Sepolia)
pub const DEST_CHAIN_ID: u64 = 84532;

/// Mainnet chain used for network-mismatch tests (Base)
pub const MAINNET_CHAIN_ID: u64 = 8453;

// -------------------------------- KEYS ----------------------------------

/// Vault private key (test-only, well-known)
pub const TEST_VAULT_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

/// Address derived from TEST_VAULT_KEY
pub const TEST_VAULT_SIGNER_ADDR: &str = "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23";

// ------------------------- ADDRESSES AND HASHES -------------------------

/// Authorized vault contract (deposit `vault` argument)
pub const DUMMY_VAULT_ADDR: &str = "0x0000000000000000000000000000000000000001";

/// Vault not in the allow-list
pub const DUMMY_ROGUE_VAULT_ADDR: &str = "0x0000000000000000000000000000000000000002";

/// Deposit recipient
pub const DUMMY_RECIPIENT_ADDR: &str = "0x0000000000000000000000000000000000000003";

/// Origin deposit contract
pub const DUMMY_DEPOSIT_CONTRACT_ADDR: &str = "0x0000000000000000000000000000000000000004";

/// Destination fill relay contract
pub const DUMMY_FILL_CONTRACT_ADDR: &str = "0x0000000000000000000000000000000000000005";

/// MBT token on the origin chain (18 decimals)
pub const DUMMY_ORIGIN_TOKEN_ADDR: &str = "0x000000000000000000000000000000000000000a";

/// MBT token on the destination chain (6 decimals)
pub const DUMMY_DEST_TOKEN_ADDR: &str = "0x000000000000000000000000000000000000000b";

/// Deposit transaction hash
pub const DUMMY_DEPOSIT_TX_HASH: &str = "0x00000000000000000000000000000000000000000000000000000000000000dd";

/// One whole token with 18 decimals
pub const ONE_TOKEN_18: u128 = 1_000_000_000_000_000_000;

pub const ONE_GWEI: u64 = 1_000_000_000;

// ============================================================================
// ADDRESS HELPERS
// ============================================================================

pub fn addr(hex: &str) -> H160 {
    hex.parse().unwrap()
}

pub fn deposit_hash() -> H256 {
    codec::deposit_hash_from_tx(DUMMY_DEPOSIT_TX_HASH).unwrap()
}

// ============================================================================
// CONFIGURATION BUILDERS
// ============================================================================

fn chain_config(chain_id: u64, name: &str, network: &str, is_mainnet: bool) -> ChainConfig {
    ChainConfig {
        name: name.to_string(),
        chain_id,
        network: network.to_string(),
        rpc_url: "http://127.0.0.1:8545".to_string(),
        deposit_contract: addr(DUMMY_DEPOSIT_CONTRACT_ADDR),
        fill_relay_contract: Some(addr(DUMMY_FILL_CONTRACT_ADDR)),
        is_mainnet,
        is_l2: None,
        is_eip1559: None,
        is_poa: None,
    }
}

fn token_config(chain_id: u64, symbol: &str, address: &str, decimals: u8) -> TokenConfig {
    TokenConfig {
        chain_id,
        symbol: symbol.to_string(),
        group: symbol.to_string(),
        address: addr(address),
        decimals,
    }
}

/// Two testnets (origin 18-decimal MBT, destination 6-decimal MBT) plus one mainnet.
pub fn build_test_config() -> Config {
    Config {
        service: ServiceConfig {
            host: "127.0.0.1".to_string(),
            port: 3335,
            fill_rate: "0.9".to_string(),
            authorized_vaults: vec![addr(DUMMY_VAULT_ADDR)],
            priority: Priority::Standard,
        },
        timeouts: Default::default(),
        store: Default::default(),
        persistence: Default::default(),
        vault: Default::default(),
        chains: vec![
            chain_config(ORIGIN_CHAIN_ID, "Ethereum Sepolia", "ETH_SEPOLIA", false),
            chain_config(DEST_CHAIN_ID, "Base Sepolia", "BASE_SEPOLIA", false),
            chain_config(MAINNET_CHAIN_ID, "Base", "BASE_MAINNET", true),
        ],
        tokens: vec![
            token_config(ORIGIN_CHAIN_ID, "MBT", DUMMY_ORIGIN_TOKEN_ADDR, 18),
            token_config(DEST_CHAIN_ID, "MBT", DUMMY_DEST_TOKEN_ADDR, 6),
            token_config(MAINNET_CHAIN_ID, "MBT", DUMMY_DEST_TOKEN_ADDR, 6),
            token_config(ORIGIN_CHAIN_ID, "ETH", "0x0000000000000000000000000000000000000000", 18),
            token_config(DEST_CHAIN_ID, "ETH", "0x0000000000000000000000000000000000000000", 18),
        ],
        gas_overrides: vec![],
    }
}

pub fn dest_chain() -> ChainProfile {
    let config = build_test_config();
    ChainProfile::from_config(config.chains.iter().find(|c| c.chain_id == DEST_CHAIN_ID).unwrap())
}

pub fn test_signer() -> Arc<VaultSigner> {
    Arc::new(VaultSigner::from_hex(TEST_VAULT_KEY).unwrap())
}

// ============================================================================
// DEPOSIT BUILDERS
// ============================================================================

pub fn build_deposit(vault: &str, amount: U256, destination_chain_id: u64) -> DepositRecord {
    DepositRecord {
        vault: addr(vault),
        recipient: codec::address_to_word(addr(DUMMY_RECIPIENT_ADDR)),
        input_token: addr(DUMMY_ORIGIN_TOKEN_ADDR),
        input_amount: amount,
        destination_chain_id,
        message: b"hello".to_vec(),
        calldata: Vec::new(),
    }
}

pub fn deposit_calldata_hex(record: &DepositRecord) -> String {
    format!("0x{}", hex::encode(codec::encode_deposit(record)))
}

/// Relay key the orchestrator derives for the default test deposit.
pub fn test_relay_key() -> RelayKey {
    RelayKey {
        origin_chain_id: ORIGIN_CHAIN_ID,
        deposit_hash: deposit_hash(),
        recipient: addr(DUMMY_RECIPIENT_ADDR),
        output_token: addr(DUMMY_DEST_TOKEN_ADDR),
    }
}

// ============================================================================
// COMPONENT BUILDERS
// ============================================================================

/// Short waits so paused-time tests finish in a few virtual seconds.
pub fn test_submitter_settings() -> SubmitterSettings {
    SubmitterSettings {
        already_known_wait: Duration::from_secs(30),
        already_known_poll: Duration::from_secs(1),
        confirmation_wait: Duration::from_secs(10),
        confirmation_poll: Duration::from_secs(1),
    }
}

pub fn build_submitter(pending_wait: Duration) -> Submitter {
    Submitter::new(
        GasEngine::default(),
        Arc::new(NonceCoordinator::new(pending_wait, Duration::from_secs(1))),
        test_signer(),
        test_submitter_settings(),
    )
}

/// Fill request for the default test relay on the destination chain.
pub fn build_fill_request(chain: &ChainProfile) -> SubmitRequest<'_> {
    let key = test_relay_key();
    SubmitRequest {
        chain,
        to: addr(DUMMY_FILL_CONTRACT_ADDR),
        value: U256::zero(),
        data: codec::encode_fill_relay(&codec::FillRecord {
            recipient: key.recipient,
            output_token: key.output_token,
            output_amount: U256::from(900_000u64),
            origin_chain_id: key.origin_chain_id,
            deposit_hash: key.deposit_hash,
            message: Vec::new(),
        }),
        tx_type: TxType::ContractCall,
        priority: Priority::Standard,
        default_gas_limit: 200_000,
        relay: Some(RelayGuard { fill_contract: addr(DUMMY_FILL_CONTRACT_ADDR), key }),
    }
}

/// Orchestrator over `chain` (destination) with in-process dedup and memory persistence.
pub fn build_orchestrator(
    chain: Arc<FakeChain>,
    dedup_ttl: Duration,
) -> (FillOrchestrator, Arc<MemoryTxLineStore>) {
    let config = build_test_config();
    let mut clients = ChainClients::new();
    clients.insert(DEST_CHAIN_ID, chain.clone());
    clients.insert(MAINNET_CHAIN_ID, chain);
    let tx_lines = Arc::new(MemoryTxLineStore::new());
    let orchestrator = FillOrchestrator::new(
        Arc::new(StaticRegistry::from_config(&config)),
        clients,
        IdempotencyGuard::in_process(100, dedup_ttl),
        build_submitter(Duration::from_secs(60)),
        tx_lines.clone(),
        OrchestratorSettings::from_config(&config.service).unwrap(),
    );
    (orchestrator, tx_lines)
}

// ============================================================================
// ERROR BUILDERS
// ============================================================================

/// A JSON-RPC error object as nodes return it.
pub fn node_error(method: &str, message: &str) -> RpcError {
    RpcError::Node { method: method.to_string(), code: -32000, message: message.to_string(), data: None }
}

/// An `execution reverted` error carrying a custom error selector.
pub fn revert_error(signature: &str) -> RpcError {
    RpcError::Node {
        method: "eth_call".to_string(),
        code: 3,
        message: "execution reverted".to_string(),
        data: Some(Value::String(format!("0x{}", hex::encode(selector(signature))))),
    }
}

// ============================================================================
// FAKE CHAIN
// ============================================================================

#[derive(Debug, Default)]
struct FakeState {
    confirmed: u64,
    pending: u64,
    /// Mine every broadcast immediately
    auto_mine: bool,
    /// Current `isRelayFilled` answer
    filled: bool,
    /// Scripted `isRelayFilled` answers, consumed before falling back to `filled`
    relay_answers: VecDeque<bool>,
    relay_checks: usize,
    /// A successful broadcast fills the relay
    fill_on_broadcast: bool,
    no_code: bool,
    estimates: VecDeque<Result<u64, RpcError>>,
    simulations: VecDeque<Result<Vec<u8>, RpcError>>,
    broadcast_errors: VecDeque<RpcError>,
    /// The next broadcast mines with status 0
    revert_next: bool,
    simulated: Vec<CallRequest>,
    broadcasts: Vec<H256>,
    mined: HashSet<H256>,
    reverted: HashSet<H256>,
    base_fee: Option<U256>,
}

/// In-memory EVM node for state-machine tests.
pub struct FakeChain {
    chain_id: u64,
    state: Mutex<FakeState>,
}

impl FakeChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(FakeState {
                auto_mine: true,
                fill_on_broadcast: true,
                base_fee: Some(U256::from(ONE_GWEI)),
                ..Default::default()
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    /// Sets the confirmed and pending transaction counts of the vault.
    pub fn set_counts(&self, confirmed: u64, pending: u64) {
        self.with_state(|s| {
            s.confirmed = confirmed;
            s.pending = pending;
        });
    }

    pub fn set_auto_mine(&self, auto_mine: bool) {
        self.with_state(|s| s.auto_mine = auto_mine);
    }

    /// Confirms every pending transaction.
    pub fn mine(&self) {
        self.with_state(|s| {
            s.confirmed = s.pending;
            let broadcasts = s.broadcasts.clone();
            s.mined.extend(broadcasts);
        });
    }

    pub fn set_filled(&self, filled: bool) {
        self.with_state(|s| s.filled = filled);
    }

    pub fn script_relay_answers(&self, answers: &[bool]) {
        self.with_state(|s| s.relay_answers = answers.iter().copied().collect());
    }

    pub fn set_fill_on_broadcast(&self, fill: bool) {
        self.with_state(|s| s.fill_on_broadcast = fill);
    }

    pub fn set_no_code(&self) {
        self.with_state(|s| s.no_code = true);
    }

    pub fn set_legacy(&self) {
        self.with_state(|s| s.base_fee = None);
    }

    pub fn push_estimate(&self, result: Result<u64, RpcError>) {
        self.with_state(|s| s.estimates.push_back(result));
    }

    pub fn push_simulation(&self, result: Result<Vec<u8>, RpcError>) {
        self.with_state(|s| s.simulations.push_back(result));
    }

    pub fn push_broadcast_error(&self, error: RpcError) {
        self.with_state(|s| s.broadcast_errors.push_back(error));
    }

    pub fn revert_next_broadcast(&self) {
        self.with_state(|s| s.revert_next = true);
    }

    pub fn broadcasts(&self) -> Vec<H256> {
        self.with_state(|s| s.broadcasts.clone())
    }

    pub fn simulated_calls(&self) -> Vec<CallRequest> {
        self.with_state(|s| s.simulated.clone())
    }

    pub fn relay_checks(&self) -> usize {
        self.with_state(|s| s.relay_checks)
    }

    pub fn is_filled(&self) -> bool {
        self.with_state(|s| s.filled)
    }

    pub fn counts(&self) -> (u64, u64) {
        self.with_state(|s| (s.confirmed, s.pending))
    }
}

fn is_relay_check(call: &CallRequest) -> bool {
    call.data.as_deref().is_some_and(|d| d.starts_with(&selector(IS_RELAY_FILLED_SIGNATURE)))
}

fn bool_word(value: bool) -> Vec<u8> {
    let mut word = vec![0u8; 32];
    word[31] = value as u8;
    word
}

#[async_trait]
impl EvmRpc for FakeChain {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        Ok(self.chain_id)
    }

    async fn transaction_count(&self, _address: H160, tag: BlockTag) -> Result<u64, RpcError> {
        Ok(self.with_state(|s| match tag {
            BlockTag::Latest => s.confirmed,
            BlockTag::Pending => s.pending,
        }))
    }

    async fn gas_price(&self) -> Result<U256, RpcError> {
        Ok(U256::from(2 * ONE_GWEI))
    }

    async fn max_priority_fee_per_gas(&self) -> Result<U256, RpcError> {
        Ok(U256::from(ONE_GWEI / 10))
    }

    async fn latest_block(&self) -> Result<BlockHeader, RpcError> {
        Ok(BlockHeader {
            number: 100,
            base_fee_per_gas: self.with_state(|s| s.base_fee),
            gas_used: 5_000_000,
            gas_limit: 30_000_000,
            extra_data_len: 32,
        })
    }

    async fn estimate_gas(&self, _call: &CallRequest) -> Result<u64, RpcError> {
        self.with_state(|s| s.estimates.pop_front().unwrap_or(Ok(90_000)))
    }

    async fn call(&self, call: &CallRequest) -> Result<Vec<u8>, RpcError> {
        self.with_state(|s| {
            if is_relay_check(call) {
                s.relay_checks += 1;
                let answer = s.relay_answers.pop_front().unwrap_or(s.filled);
                s.filled = answer;
                return Ok(bool_word(answer));
            }
            s.simulated.push(call.clone());
            s.simulations.pop_front().unwrap_or(Ok(Vec::new()))
        })
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256, RpcError> {
        self.with_state(|s| {
            if let Some(error) = s.broadcast_errors.pop_front() {
                return Err(error);
            }
            let hash = H256(keccak256(raw));
            s.broadcasts.push(hash);
            s.pending += 1;
            if std::mem::take(&mut s.revert_next) {
                s.reverted.insert(hash);
            }
            if s.auto_mine {
                s.confirmed = s.pending;
                s.mined.insert(hash);
            }
            if s.fill_on_broadcast {
                s.filled = true;
            }
            Ok(hash)
        })
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, RpcError> {
        Ok(self.with_state(|s| {
            s.mined.contains(&hash).then(|| Receipt {
                transaction_hash: hash,
                block_number: Some(101),
                status: Some(if s.reverted.contains(&hash) { 0 } else { 1 }),
                gas_used: Some(80_000),
            })
        }))
    }

    async fn code_at(&self, _address: H160) -> Result<Vec<u8>, RpcError> {
        Ok(self.with_state(|s| if s.no_code { Vec::new() } else { vec![0x60, 0x80, 0x60, 0x40] }))
    }
}
