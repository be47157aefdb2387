//! Fill Orchestrator
//!
//! Turns one observed deposit into one fill on the destination chain.
//!
//! The pipeline is split in two so the webhook can answer immediately:
//!
//! - [`FillOrchestrator::admit`]: decode, vault allow-list, idempotency.
//!   No chain RPC, bounded by the key-value store round trip.
//! - [`FillOrchestrator::execute`]: registry lookups, network guard, output
//!   amount, submission, confirmation and persistence.
//!
//! [`FillOrchestrator::handle_deposit_event`] runs both in sequence.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ethereum_types::{H160, H256, U256};
use tracing::{error, info, warn};

use crate::amount::{compute_output_amount, FillRate};
use crate::codec::{self, DecodedCall, DepositRecord, FillRecord};
use crate::config::{Config, ServiceConfig};
use crate::crypto::VaultSigner;
use crate::dedup::IdempotencyGuard;
use crate::error::RelayError;
use crate::evm_client::{EvmClient, EvmRpc};
use crate::gas::{GasEngine, Priority, TxType};
use crate::nonce::{DistributedNonceAllocator, NonceCoordinator};
use crate::persistence::{JsonlTxLineStore, TxKind, TxLine, TxLineStore, TxStatus};
use crate::registry::{ChainProfile, Registry, StaticRegistry, TokenQuery};
use crate::relay_state::{Checkpoint, RelayKey};
use crate::submitter::{
    Confirmation, RelayGuard, SubmitOutcome, SubmitRequest, Submitter, SubmitterSettings, DEFAULT_CONTRACT_CALL_GAS,
};
use crate::store::{KvStore, RedisStore};

// ============================================================================
// INPUT / OUTPUT TYPES
// ============================================================================

/// How the event identifies its source chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginChain {
    Id(u64),
    /// Webhook provider network name, e.g. `ETH_SEPOLIA`
    Network(String),
}

/// One deposit transaction as delivered by a webhook or poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub origin: OriginChain,
    /// Source transaction hash (hex)
    pub tx_hash: String,
    /// Transaction input (hex)
    pub calldata: String,
    /// Transaction sender, when the envelope carries it
    pub from: Option<H160>,
}

/// A deposit that passed the cheap guards and was claimed in the dedup store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDeposit {
    pub deposit_hash: H256,
    pub origin: OriginChain,
    pub recipient: H160,
    pub record: DepositRecord,
    pub from: Option<H160>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted(ValidatedDeposit),
    Duplicate { deposit_hash: H256 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    /// Fill mined successfully
    Filled { tx_hash: H256, nonce: u64 },
    /// Fill broadcast but not mined within the confirmation budget
    Submitted { tx_hash: H256, nonce: u64 },
    AlreadyFilled { checkpoint: Checkpoint },
    Duplicate { deposit_hash: H256 },
}

// ============================================================================
// CHAIN CLIENTS
// ============================================================================

/// One RPC client per configured chain.
#[derive(Clone, Default)]
pub struct ChainClients {
    clients: HashMap<u64, Arc<dyn EvmRpc>>,
}

impl ChainClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chain_id: u64, client: Arc<dyn EvmRpc>) {
        self.clients.insert(chain_id, client);
    }

    /// Builds an [`EvmClient`] for every chain in the registry.
    pub fn from_registry(registry: &StaticRegistry, call_timeout: Duration) -> anyhow::Result<Self> {
        let mut clients = Self::new();
        for chain in registry.chains() {
            let client = EvmClient::new(&chain.rpc_url, call_timeout, chain.is_poa)?;
            clients.insert(chain.chain_id, Arc::new(client));
        }
        Ok(clients)
    }

    pub fn get(&self, chain_id: u64) -> Result<Arc<dyn EvmRpc>, RelayError> {
        self.clients
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| RelayError::ChainNotFound(format!("no RPC client for chain {}", chain_id)))
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub authorized_vaults: HashSet<H160>,
    pub fill_rate: FillRate,
    pub priority: Priority,
}

impl OrchestratorSettings {
    pub fn from_config(service: &ServiceConfig) -> anyhow::Result<Self> {
        Ok(Self {
            authorized_vaults: service.authorized_vaults.iter().copied().collect(),
            fill_rate: FillRate::parse(&service.fill_rate)?,
            priority: service.priority,
        })
    }
}

pub struct FillOrchestrator {
    registry: Arc<dyn Registry>,
    clients: ChainClients,
    dedup: IdempotencyGuard,
    submitter: Submitter,
    tx_lines: Arc<dyn TxLineStore>,
    settings: OrchestratorSettings,
}

impl FillOrchestrator {
    pub fn new(
        registry: Arc<dyn Registry>,
        clients: ChainClients,
        dedup: IdempotencyGuard,
        submitter: Submitter,
        tx_lines: Arc<dyn TxLineStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self { registry, clients, dedup, submitter, tx_lines, settings }
    }

    /// Wires every collaborator from configuration.
    ///
    /// Connects to redis when `store.redis_url` is set (dedup and, if enabled,
    /// the distributed nonce allocator share it); otherwise dedup falls back
    /// to an in-process LRU.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let registry = StaticRegistry::from_config(config);
        let clients = ChainClients::from_registry(&registry, Duration::from_secs(config.timeouts.rpc_timeout_secs))?;
        let signer = Arc::new(VaultSigner::from_config(&config.vault)?);
        info!("Vault signing address: {:?}", signer.address());

        let dedup_ttl = Duration::from_secs(config.store.dedup_ttl_secs);
        let mut nonces = NonceCoordinator::new(config.timeouts.pending_wait(), config.timeouts.pending_poll());
        let dedup = match &config.store.redis_url {
            Some(url) => {
                let store: Arc<dyn KvStore> = Arc::new(RedisStore::connect(url).await?);
                info!("Using redis at {} for dedup", url);
                if config.store.distributed_nonce {
                    info!("Distributed nonce allocation enabled");
                    nonces = nonces.with_distributed(DistributedNonceAllocator::new(
                        store.clone(),
                        Duration::from_secs(config.store.nonce_lock_ttl_secs),
                        config.store.nonce_lock_attempts,
                    ));
                }
                IdempotencyGuard::with_store(store, dedup_ttl)
            }
            None => {
                warn!("No redis_url configured, dedup is local to this process");
                IdempotencyGuard::in_process(config.store.lru_capacity, dedup_ttl)
            }
        };

        let submitter = Submitter::new(
            GasEngine::new(&config.gas_overrides),
            Arc::new(nonces),
            signer,
            SubmitterSettings::from(&config.timeouts),
        );
        let tx_lines: Arc<dyn TxLineStore> = Arc::new(JsonlTxLineStore::new(&config.persistence.tx_lines_path));

        Ok(Self::new(
            Arc::new(registry),
            clients,
            dedup,
            submitter,
            tx_lines,
            OrchestratorSettings::from_config(&config.service)?,
        ))
    }

    /// Decodes the deposit, applies the vault guard and claims it in the dedup store.
    ///
    /// # Returns
    ///
    /// * `Ok(Admission::Accepted)` - Ready for [`FillOrchestrator::execute`]
    /// * `Ok(Admission::Duplicate)` - Seen within the dedup TTL
    /// * `Err(RelayError)` - Malformed calldata, invalid recipient or unauthorized vault
    pub async fn admit(&self, event: &DepositEvent) -> Result<Admission, RelayError> {
        let record = match codec::decode_hex(&event.calldata)? {
            Some(DecodedCall::Deposit(record)) => record,
            Some(DecodedCall::Fill(_)) => return Err(RelayError::UnexpectedCall("fillRelay".to_string())),
            None => {
                let selector: String = event.calldata.trim_start_matches("0x").chars().take(8).collect();
                return Err(RelayError::UnexpectedCall(format!("0x{}", selector)));
            }
        };
        let recipient = record.recipient_address().ok_or(RelayError::InvalidRecipient)?;

        if !self.settings.authorized_vaults.contains(&record.vault) {
            warn!("Rejecting deposit {} from unauthorized vault {:?}", event.tx_hash, record.vault);
            return Err(RelayError::UnauthorizedVault(record.vault));
        }

        let deposit_hash = codec::deposit_hash_from_tx(&event.tx_hash)?;
        if !self.dedup.mark_if_new(deposit_hash).await? {
            info!("Deposit {:?} already being processed, skipping", deposit_hash);
            return Ok(Admission::Duplicate { deposit_hash });
        }

        info!(
            "Admitted deposit {:?}: vault={:?} amount={} destination={}",
            deposit_hash, record.vault, record.input_amount, record.destination_chain_id
        );
        Ok(Admission::Accepted(ValidatedDeposit {
            deposit_hash,
            origin: event.origin.clone(),
            recipient,
            record,
            from: event.from,
        }))
    }

    /// Fills an admitted deposit and records the result.
    pub async fn execute(&self, deposit: ValidatedDeposit) -> Result<FillOutcome, RelayError> {
        let deposit_hash = deposit.deposit_hash;
        let result = self.execute_inner(&deposit).await;
        match &result {
            Ok(outcome) => info!("Deposit {:?}: {:?}", deposit_hash, outcome),
            Err(e) => match e.contract_error_name() {
                Some(name) => error!("Deposit {:?} failed ({}): {}", deposit_hash, name, e.reason()),
                None => error!("Deposit {:?} failed: {}", deposit_hash, e.reason()),
            },
        }
        result
    }

    /// Admits and executes one deposit event.
    pub async fn handle_deposit_event(&self, event: &DepositEvent) -> Result<FillOutcome, RelayError> {
        match self.admit(event).await? {
            Admission::Duplicate { deposit_hash } => Ok(FillOutcome::Duplicate { deposit_hash }),
            Admission::Accepted(deposit) => self.execute(deposit).await,
        }
    }

    fn origin_chain(&self, origin: &OriginChain) -> Result<ChainProfile, RelayError> {
        match origin {
            OriginChain::Id(chain_id) => self.registry.chain_by_id(*chain_id),
            OriginChain::Network(network) => self.registry.chain_by_network(network),
        }
    }

    async fn execute_inner(&self, deposit: &ValidatedDeposit) -> Result<FillOutcome, RelayError> {
        let record = &deposit.record;
        let origin = self.origin_chain(&deposit.origin)?;
        let destination = self.registry.chain_by_id(record.destination_chain_id)?;

        if origin.is_mainnet != destination.is_mainnet {
            return Err(RelayError::NetworkMismatch {
                origin: origin.chain_id,
                origin_mainnet: origin.is_mainnet,
                destination: destination.chain_id,
                destination_mainnet: destination.is_mainnet,
            });
        }

        let input_token = self.registry.token(origin.chain_id, TokenQuery::Address(record.input_token))?;
        let output_token = self
            .registry
            .token(destination.chain_id, TokenQuery::Group(&input_token.group))?;
        let output_amount = compute_output_amount(
            record.input_amount,
            input_token.decimals,
            output_token.decimals,
            &self.settings.fill_rate,
        )?;
        if output_amount.is_zero() {
            return Err(RelayError::Amount(format!(
                "input {} {} rounds to zero output",
                record.input_amount, input_token.symbol
            )));
        }
        info!(
            "Deposit {:?}: {} {} on chain {} -> {} {} on chain {} (rate {})",
            deposit.deposit_hash,
            record.input_amount,
            input_token.symbol,
            origin.chain_id,
            output_amount,
            output_token.symbol,
            destination.chain_id,
            self.settings.fill_rate
        );

        self.record(TxLine {
            tx_hash: deposit.deposit_hash,
            chain_id: origin.chain_id,
            kind: TxKind::Deposit,
            from: deposit.from.unwrap_or(record.vault),
            to: origin.deposit_contract,
            token: record.input_token,
            amount: record.input_amount,
            status: TxStatus::Confirmed,
            related_tx_hash: None,
            failure_reason: None,
            timestamp: Utc::now(),
        })
        .await;

        let fill_contract = destination.fill_contract()?;
        let fill = FillRecord {
            recipient: deposit.recipient,
            output_token: output_token.address,
            output_amount,
            origin_chain_id: origin.chain_id,
            deposit_hash: deposit.deposit_hash,
            message: Vec::new(),
        };
        let value = if fill.is_native_output() { output_amount } else { U256::zero() };
        let rpc = self.clients.get(destination.chain_id)?;

        let request = SubmitRequest {
            chain: &destination,
            to: fill_contract,
            value,
            data: codec::encode_fill_relay(&fill),
            tx_type: TxType::ContractCall,
            priority: self.settings.priority,
            default_gas_limit: DEFAULT_CONTRACT_CALL_GAS,
            relay: Some(RelayGuard {
                fill_contract,
                key: RelayKey {
                    origin_chain_id: origin.chain_id,
                    deposit_hash: deposit.deposit_hash,
                    recipient: fill.recipient,
                    output_token: fill.output_token,
                },
            }),
        };

        let fill_line = |tx_hash: H256, status: TxStatus| TxLine {
            tx_hash,
            chain_id: destination.chain_id,
            kind: TxKind::Fill,
            from: self.submitter.address(),
            to: fill_contract,
            token: fill.output_token,
            amount: output_amount,
            status,
            related_tx_hash: Some(deposit.deposit_hash),
            failure_reason: None,
            timestamp: Utc::now(),
        };

        match self.submitter.submit(rpc.as_ref(), &request).await {
            Ok(SubmitOutcome::AlreadyFilled { checkpoint }) => Ok(FillOutcome::AlreadyFilled { checkpoint }),
            Ok(SubmitOutcome::ConfirmedByExisting { tx_hash, nonce }) => {
                self.record(fill_line(tx_hash, TxStatus::Confirmed)).await;
                Ok(FillOutcome::Filled { tx_hash, nonce })
            }
            Ok(SubmitOutcome::Broadcast { tx_hash, nonce }) => {
                self.record(fill_line(tx_hash, TxStatus::Pending)).await;
                match self.submitter.await_confirmation(rpc.as_ref(), tx_hash).await? {
                    Confirmation::Confirmed(receipt) => {
                        info!(
                            "Fill {:?} confirmed in block {:?} (gas used {:?})",
                            tx_hash, receipt.block_number, receipt.gas_used
                        );
                        self.mark(self.tx_lines.mark_confirmed(tx_hash).await);
                        Ok(FillOutcome::Filled { tx_hash, nonce })
                    }
                    Confirmation::Reverted(_) => {
                        let err = RelayError::Reverted { tx_hash };
                        self.mark(self.tx_lines.mark_failed(tx_hash, &err.reason()).await);
                        Err(err)
                    }
                    Confirmation::Pending => {
                        warn!("Fill {:?} not confirmed yet, left as pending", tx_hash);
                        Ok(FillOutcome::Submitted { tx_hash, nonce })
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Persistence failures are logged; the chain stays the source of truth.
    async fn record(&self, line: TxLine) {
        let tx_hash = line.tx_hash;
        if let Err(e) = self.tx_lines.append(line).await {
            warn!("Failed to record transaction {:?}: {}", tx_hash, e);
        }
    }

    fn mark(&self, result: Result<(), RelayError>) {
        if let Err(e) = result {
            warn!("Failed to update transaction status: {}", e);
        }
    }
}
