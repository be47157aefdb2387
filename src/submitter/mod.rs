//! Transaction Submitter
//!
//! Drives one submission through
//! `ESTIMATE_GAS → SIMULATE → CHECK_RELAY_STATE → BUILD → SIGN → BROADCAST`,
//! entering `WAIT_PENDING` whenever the nonce coordinator reports in-flight
//! transactions. Relay state is checked before building parameters, after
//! every pending wait and immediately before broadcast; a filled relay at any
//! checkpoint ends the attempt with [`SubmitOutcome::AlreadyFilled`] and
//! nothing is broadcast.
//!
//! Confirmation is a separate bounded step ([`Submitter::await_confirmation`])
//! owned by the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethereum_types::{H160, H256, U256};
use tracing::{error, info, warn};

use crate::abi::decode_revert;
use crate::config::TimeoutConfig;
use crate::crypto::VaultSigner;
use crate::error::{
    is_allowance_failure, is_already_known, is_insufficient_funds, is_out_of_gas, is_replacement_underpriced,
    required_gas_hint, RelayError,
};
use crate::evm_client::{BlockTag, CallRequest, EvmRpc, Receipt, RpcError};
use crate::gas::{GasEngine, GasPlan, GasRequest, Priority, TxType};
use crate::nonce::{NonceCoordinator, NonceLease, NonceState};
use crate::registry::ChainProfile;
use crate::relay_state::{is_filled, Checkpoint, RelayKey, RelayStatus};
use crate::retry::RetryPolicy;
use crate::tx::UnsignedTransaction;

/// Pending waits per attempt before giving up; each wait has its own budget.
const MAX_PENDING_WAITS: u32 = 3;

/// Conservative gas limit for contract calls whose estimate failed.
pub const DEFAULT_CONTRACT_CALL_GAS: u64 = 200_000;

#[derive(Debug, Clone)]
pub struct SubmitterSettings {
    pub already_known_wait: Duration,
    pub already_known_poll: Duration,
    pub confirmation_wait: Duration,
    pub confirmation_poll: Duration,
}

impl From<&TimeoutConfig> for SubmitterSettings {
    fn from(timeouts: &TimeoutConfig) -> Self {
        Self {
            already_known_wait: timeouts.already_known_wait(),
            already_known_poll: Duration::from_secs(1),
            confirmation_wait: timeouts.confirmation_wait(),
            confirmation_poll: timeouts.confirmation_poll(),
        }
    }
}

/// Relay to re-verify during submission.
#[derive(Debug, Clone, Copy)]
pub struct RelayGuard {
    pub fill_contract: H160,
    pub key: RelayKey,
}

/// One contract call to submit.
#[derive(Debug, Clone)]
pub struct SubmitRequest<'a> {
    pub chain: &'a ChainProfile,
    pub to: H160,
    pub value: U256,
    pub data: Vec<u8>,
    pub tx_type: TxType,
    pub priority: Priority,
    /// Fallback limit when estimation fails for reasons other than funds/allowance
    pub default_gas_limit: u64,
    pub relay: Option<RelayGuard>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted by the node; confirmation still outstanding
    Broadcast { tx_hash: H256, nonce: u64 },
    /// Node already had this exact transaction and it has since confirmed
    ConfirmedByExisting { tx_hash: H256, nonce: u64 },
    /// Someone filled the relay; nothing was broadcast
    AlreadyFilled { checkpoint: Checkpoint },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed(Receipt),
    Reverted(Receipt),
    /// Still not mined when the confirmation budget ran out
    Pending,
}

enum Simulation {
    Passed,
    RelayAlreadyFilled,
}

enum Poll {
    NotYet,
    Rpc(RpcError),
}

pub struct Submitter {
    gas: GasEngine,
    nonces: Arc<NonceCoordinator>,
    signer: Arc<VaultSigner>,
    settings: SubmitterSettings,
}

impl Submitter {
    pub fn new(
        gas: GasEngine,
        nonces: Arc<NonceCoordinator>,
        signer: Arc<VaultSigner>,
        settings: SubmitterSettings,
    ) -> Self {
        Self { gas, nonces, signer, settings }
    }

    pub fn address(&self) -> H160 {
        self.signer.address()
    }

    /// Submits `request` and returns once it is broadcast (or found filled).
    ///
    /// # Returns
    ///
    /// * `Ok(SubmitOutcome)` - Broadcast, confirmed-by-existing, or already filled
    /// * `Err(RelayError)` - Classified failure; see [`RelayError::kind`]
    pub async fn submit(&self, rpc: &dyn EvmRpc, request: &SubmitRequest<'_>) -> Result<SubmitOutcome, RelayError> {
        let chain_id = request.chain.chain_id;

        if self.relay_filled(rpc, request, Checkpoint::BeforeParams).await? {
            return Ok(SubmitOutcome::AlreadyFilled { checkpoint: Checkpoint::BeforeParams });
        }

        let estimate = self.estimate_gas(rpc, request).await?;

        let mut lease = self.nonces.lease(chain_id, self.address()).await?;
        let result = self.submit_leased(rpc, request, &mut lease, estimate).await;
        self.nonces.release(lease).await;

        match &result {
            Ok(outcome) => info!("Chain {}: submission finished: {:?}", chain_id, outcome),
            Err(e) => error!("Chain {}: submission failed: {}", chain_id, e.reason()),
        }
        result
    }

    async fn submit_leased(
        &self,
        rpc: &dyn EvmRpc,
        request: &SubmitRequest<'_>,
        lease: &mut NonceLease,
        estimate: u64,
    ) -> Result<SubmitOutcome, RelayError> {
        let chain_id = request.chain.chain_id;
        let from = self.address();

        let mut state: NonceState = self.nonces.resolve(lease, rpc).await?;
        let mut waits = 0;
        while state.has_pending {
            if waits == MAX_PENDING_WAITS {
                return Err(RelayError::PendingTimeout {
                    chain_id,
                    address: from,
                    waited_secs: self.nonces.pending_wait_budget().as_secs() * u64::from(waits),
                });
            }
            state = self.nonces.wait_for_clear(lease, rpc, &state).await?;
            waits += 1;

            if self.relay_filled(rpc, request, Checkpoint::AfterPendingWait).await? {
                return Ok(SubmitOutcome::AlreadyFilled { checkpoint: Checkpoint::AfterPendingWait });
            }
        }

        let quote = self
            .gas
            .quote(
                rpc,
                &GasRequest {
                    chain: request.chain,
                    from,
                    priority: request.priority,
                    tx_type: request.tx_type,
                    estimated_gas: Some(estimate),
                    token: None,
                },
            )
            .await?;
        let mut plan = GasPlan::new(from, state.nonce, quote);

        if let Simulation::RelayAlreadyFilled = self.simulate(rpc, request, &mut plan).await? {
            return Ok(SubmitOutcome::AlreadyFilled { checkpoint: Checkpoint::Simulation });
        }

        if self.relay_filled(rpc, request, Checkpoint::BeforeBroadcast).await? {
            return Ok(SubmitOutcome::AlreadyFilled { checkpoint: Checkpoint::BeforeBroadcast });
        }

        let tx = UnsignedTransaction::from_plan(chain_id, &plan, request.to, request.value, request.data.clone());
        let signed = tx.sign(&self.signer)?;
        info!(
            "Chain {}: broadcasting {:?} nonce={} gas_limit={} fees={:?}",
            chain_id, signed.hash, plan.nonce, plan.gas_limit, plan.fees
        );

        match rpc.send_raw_transaction(&signed.raw).await {
            Ok(tx_hash) => {
                lease.commit(plan.nonce);
                Ok(SubmitOutcome::Broadcast { tx_hash, nonce: plan.nonce })
            }
            Err(e) => {
                let message = e.message();
                if is_already_known(&message) {
                    lease.commit(plan.nonce);
                    warn!("Chain {}: nonce {} already known, waiting for it to confirm", chain_id, plan.nonce);
                    self.wait_confirmed_count(rpc, from, plan.nonce).await?;
                    Ok(SubmitOutcome::ConfirmedByExisting { tx_hash: signed.hash, nonce: plan.nonce })
                } else if is_replacement_underpriced(&message) {
                    Err(RelayError::ReplacementUnderpriced { nonce: plan.nonce, message })
                } else {
                    Err(RelayError::BroadcastFailed { nonce: plan.nonce, message })
                }
            }
        }
    }

    async fn relay_filled(
        &self,
        rpc: &dyn EvmRpc,
        request: &SubmitRequest<'_>,
        checkpoint: Checkpoint,
    ) -> Result<bool, RelayError> {
        let Some(guard) = request.relay else {
            return Ok(false);
        };
        match is_filled(rpc, request.chain.chain_id, guard.fill_contract, &guard.key).await? {
            RelayStatus::Filled => {
                info!(
                    "Chain {}: relay {:?} already filled ({})",
                    request.chain.chain_id, guard.key.deposit_hash, checkpoint
                );
                Ok(true)
            }
            RelayStatus::NotFilled => Ok(false),
            // Simulation reverts with RelayAlreadyFilled if this was wrong.
            RelayStatus::Unknown(_) => Ok(false),
        }
    }

    fn base_call(&self, request: &SubmitRequest<'_>) -> CallRequest {
        CallRequest {
            from: Some(self.address()),
            to: Some(request.to),
            value: Some(request.value),
            data: Some(request.data.clone()),
            ..Default::default()
        }
    }

    /// `eth_estimateGas` with failure classification.
    ///
    /// Funds and allowance failures are fatal; out-of-gas retries once with a
    /// doubled gas cap; anything else falls back to the request's default.
    async fn estimate_gas(&self, rpc: &dyn EvmRpc, request: &SubmitRequest<'_>) -> Result<u64, RelayError> {
        let chain_id = request.chain.chain_id;
        let call = self.base_call(request);
        let doubled_cap = AtomicU64::new(0);

        let result = RetryPolicy::immediate(1)
            .run(
                |attempt| {
                    let mut call = call.clone();
                    if attempt > 0 {
                        call.gas = Some(doubled_cap.load(Ordering::SeqCst));
                    }
                    let doubled_cap = &doubled_cap;
                    async move {
                        rpc.estimate_gas(&call).await.map_err(|e| {
                            let message = e.message();
                            if is_out_of_gas(&message) {
                                let base = required_gas_hint(&message).unwrap_or(request.default_gas_limit);
                                doubled_cap.store(base.saturating_mul(2), Ordering::SeqCst);
                            }
                            e
                        })
                    }
                },
                |e| is_out_of_gas(&e.message()),
            )
            .await;

        let error = match result {
            Ok(estimate) => return Ok(estimate),
            Err(e) => e,
        };
        let message = error.message();
        let revert = error.revert_data().as_deref().and_then(decode_revert);

        if is_allowance_failure(&message) {
            return Err(RelayError::InsufficientAllowance(message));
        }
        if is_insufficient_funds(&message) || revert.as_ref().is_some_and(|r| r.name == "InsufficientBalance") {
            return Err(RelayError::InsufficientBalance(message));
        }
        if is_out_of_gas(&message) {
            let cap = doubled_cap.load(Ordering::SeqCst);
            warn!("Chain {}: estimation out of gas after retry, using doubled limit {}", chain_id, cap);
            return Ok(cap);
        }
        warn!(
            "Chain {}: gas estimation failed ({}), using default limit {}",
            chain_id, message, request.default_gas_limit
        );
        Ok(request.default_gas_limit)
    }

    /// Dry-run `eth_call` with the planned gas and fees.
    ///
    /// Out-of-gas doubles `plan.gas_limit` and retries once.
    async fn simulate(
        &self,
        rpc: &dyn EvmRpc,
        request: &SubmitRequest<'_>,
        plan: &mut GasPlan,
    ) -> Result<Simulation, RelayError> {
        let mut call = self.base_call(request);
        plan.fees.apply_to(&mut call);
        let initial_limit = plan.gas_limit;
        let used_limit = AtomicU64::new(initial_limit);

        let result = RetryPolicy::immediate(1)
            .run(
                |attempt| {
                    let limit = initial_limit.saturating_mul(1 << attempt);
                    used_limit.store(limit, Ordering::SeqCst);
                    let call = CallRequest { gas: Some(limit), ..call.clone() };
                    async move { rpc.call(&call).await }
                },
                |e| is_out_of_gas(&e.message()),
            )
            .await;

        let error = match result {
            Ok(_) => {
                let limit = used_limit.load(Ordering::SeqCst);
                if limit != initial_limit {
                    info!("Chain {}: simulation needed doubled gas limit {}", request.chain.chain_id, limit);
                    plan.gas_limit = limit;
                }
                return Ok(Simulation::Passed);
            }
            Err(e) => e,
        };

        let message = error.message();
        if let Some(revert) = error.revert_data().as_deref().and_then(decode_revert) {
            return match revert.name.as_str() {
                "RelayAlreadyFilled" => Ok(Simulation::RelayAlreadyFilled),
                "InsufficientBalance" => Err(RelayError::InsufficientBalance(revert.detail)),
                "Error" if is_allowance_failure(&revert.detail) => {
                    Err(RelayError::InsufficientAllowance(revert.detail))
                }
                "Error" if is_insufficient_funds(&revert.detail) => {
                    Err(RelayError::InsufficientBalance(revert.detail))
                }
                "SafeERC20FailedOperation" => Err(RelayError::InsufficientAllowance(revert.detail)),
                _ => Err(RelayError::ContractError { name: revert.name, detail: revert.detail }),
            };
        }
        if message.contains("RelayAlreadyFilled") {
            return Ok(Simulation::RelayAlreadyFilled);
        }
        if is_allowance_failure(&message) {
            return Err(RelayError::InsufficientAllowance(message));
        }
        if is_insufficient_funds(&message) {
            return Err(RelayError::InsufficientBalance(message));
        }
        Err(RelayError::SimulationFailed(message))
    }

    /// Polls the confirmed count until it passes `nonce`.
    async fn wait_confirmed_count(&self, rpc: &dyn EvmRpc, from: H160, nonce: u64) -> Result<(), RelayError> {
        let policy = RetryPolicy::polling(self.settings.already_known_wait, self.settings.already_known_poll);
        let outcome = policy
            .run(
                |_| async move {
                    match rpc.transaction_count(from, BlockTag::Latest).await {
                        Ok(confirmed) if confirmed > nonce => Ok(()),
                        Ok(_) => Err(Poll::NotYet),
                        Err(e) => Err(Poll::Rpc(e)),
                    }
                },
                |e| matches!(e, Poll::NotYet),
            )
            .await;
        match outcome {
            Ok(()) => Ok(()),
            Err(Poll::Rpc(e)) => Err(e.into()),
            Err(Poll::NotYet) => Err(RelayError::AlreadyKnownTimeout {
                nonce,
                waited_secs: self.settings.already_known_wait.as_secs(),
            }),
        }
    }

    /// Waits a bounded time for the receipt of `tx_hash`.
    ///
    /// Transient RPC failures while polling count as "not yet".
    pub async fn await_confirmation(&self, rpc: &dyn EvmRpc, tx_hash: H256) -> Result<Confirmation, RelayError> {
        let policy = RetryPolicy::polling(self.settings.confirmation_wait, self.settings.confirmation_poll);
        let outcome = policy
            .run(
                |_| async move {
                    match rpc.transaction_receipt(tx_hash).await {
                        Ok(Some(receipt)) => Ok(receipt),
                        Ok(None) => Err(Poll::NotYet),
                        Err(e) => Err(Poll::Rpc(e)),
                    }
                },
                |_| true,
            )
            .await;

        match outcome {
            Ok(receipt) if receipt.is_success() => Ok(Confirmation::Confirmed(receipt)),
            Ok(receipt) => Ok(Confirmation::Reverted(receipt)),
            Err(Poll::NotYet) => Ok(Confirmation::Pending),
            Err(Poll::Rpc(e)) => {
                warn!("Receipt polling for {:?} ended with RPC error: {}", tx_hash, e);
                Ok(Confirmation::Pending)
            }
        }
    }
}
