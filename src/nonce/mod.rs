//! Nonce Coordinator
//!
//! Resolves the next nonce for a (chain, signing address) pair and keeps
//! submissions for that pair strictly sequential:
//!
//! - A per-pair async mutex, held through a [`NonceLease`], serialises
//!   resolve → sign → broadcast inside one process.
//! - A high-water mark of committed nonces covers nodes whose pending view
//!   lags behind a broadcast we just made.
//! - When the node reports transactions in flight (pending > latest), callers
//!   wait for them to confirm with [`NonceCoordinator::wait_for_clear`], a
//!   bounded poll that ends in `PendingTimeout` rather than hanging.
//! - Across processes, [`DistributedNonceAllocator`] reserves nonces through
//!   the shared store under a lock released by compare-and-delete.

mod distributed;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ethereum_types::H160;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::evm_client::{BlockTag, EvmRpc, RpcError};
use crate::retry::RetryPolicy;

pub use distributed::DistributedNonceAllocator;

/// Counts read from the node plus the nonce to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceState {
    pub nonce: u64,
    /// `eth_getTransactionCount(.., "latest")`
    pub confirmed: u64,
    /// `eth_getTransactionCount(.., "pending")`
    pub pending: u64,
    /// An earlier transaction from this address is not yet confirmed
    pub has_pending: bool,
}

/// Reads both transaction counts and derives the next nonce.
///
/// The pending count is the nonce to use; `has_pending` is set when it is
/// ahead of the confirmed count.
pub async fn resolve(rpc: &dyn EvmRpc, address: H160) -> Result<NonceState, RelayError> {
    let confirmed = rpc.transaction_count(address, BlockTag::Latest).await?;
    let pending = rpc.transaction_count(address, BlockTag::Pending).await?;
    Ok(NonceState { nonce: pending.max(confirmed), confirmed, pending, has_pending: pending > confirmed })
}

#[derive(Debug, Default)]
struct KeyState {
    /// One past the highest nonce this process broadcast
    high_water: Option<u64>,
}

/// Exclusive right to submit for one (chain, address) pair.
///
/// Must be handed back through [`NonceCoordinator::release`].
pub struct NonceLease {
    chain_id: u64,
    address: H160,
    state: OwnedMutexGuard<KeyState>,
    /// Nonce reserved in the shared store and not yet committed
    reserved: Option<u64>,
    committed: Option<u64>,
}

impl NonceLease {
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn address(&self) -> H160 {
        self.address
    }

    /// Marks `nonce` as used by a transaction that reached the mempool.
    pub fn commit(&mut self, nonce: u64) {
        let next = nonce + 1;
        self.state.high_water = Some(self.state.high_water.map_or(next, |h| h.max(next)));
        self.committed = Some(nonce);
    }
}

enum WaitError {
    StillPending { confirmed: u64 },
    Rpc(RpcError),
}

pub struct NonceCoordinator {
    keys: Mutex<HashMap<(u64, H160), Arc<AsyncMutex<KeyState>>>>,
    wait_policy: RetryPolicy,
    distributed: Option<DistributedNonceAllocator>,
}

impl NonceCoordinator {
    /// # Arguments
    ///
    /// * `pending_wait` - Budget for in-flight transactions to confirm
    /// * `poll_interval` - Delay between confirmed-count polls
    pub fn new(pending_wait: Duration, poll_interval: Duration) -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            wait_policy: RetryPolicy::polling(pending_wait, poll_interval),
            distributed: None,
        }
    }

    pub fn with_distributed(mut self, allocator: DistributedNonceAllocator) -> Self {
        self.distributed = Some(allocator);
        self
    }

    pub fn pending_wait_budget(&self) -> Duration {
        self.wait_policy.budget()
    }

    /// Waits for exclusive access to the (chain, address) pair.
    pub async fn lease(&self, chain_id: u64, address: H160) -> Result<NonceLease, RelayError> {
        let key_lock = {
            let mut keys = self
                .keys
                .lock()
                .map_err(|_| RelayError::Store("nonce key table lock poisoned".to_string()))?;
            keys.entry((chain_id, address)).or_default().clone()
        };
        let state = key_lock.lock_owned().await;
        Ok(NonceLease { chain_id, address, state, reserved: None, committed: None })
    }

    /// Resolves the nonce for the leased pair.
    ///
    /// # Returns
    ///
    /// * `Ok(NonceState)` - `has_pending` tells the caller it must wait first
    /// * `Err(RelayError)` - RPC or shared-store failure
    pub async fn resolve(&self, lease: &mut NonceLease, rpc: &dyn EvmRpc) -> Result<NonceState, RelayError> {
        let chain = resolve(rpc, lease.address).await?;
        let local = lease.state.high_water.unwrap_or(0);
        let in_flight = chain.pending.max(local).max(chain.confirmed);
        let mut state = NonceState {
            nonce: in_flight,
            confirmed: chain.confirmed,
            pending: chain.pending,
            has_pending: in_flight > chain.confirmed,
        };

        if !state.has_pending {
            if let Some(allocator) = &self.distributed {
                let reserved = allocator.reserve(lease.chain_id, lease.address, state.nonce).await?;
                lease.reserved = Some(reserved);
                state.nonce = reserved;
            }
        }

        debug!(
            "Chain {} {:?}: nonce={} confirmed={} pending={} local={} has_pending={}",
            lease.chain_id, lease.address, state.nonce, state.confirmed, state.pending, local, state.has_pending
        );
        Ok(state)
    }

    /// Polls until every in-flight transaction is confirmed, then re-resolves.
    ///
    /// # Returns
    ///
    /// * `Ok(NonceState)` - Fresh state with no pending transactions ahead
    /// * `Err(RelayError::PendingTimeout)` - Budget exhausted
    pub async fn wait_for_clear(
        &self,
        lease: &mut NonceLease,
        rpc: &dyn EvmRpc,
        state: &NonceState,
    ) -> Result<NonceState, RelayError> {
        let target = state.nonce;
        let address = lease.address;
        info!(
            "Chain {} {:?}: waiting for nonces {}..{} to confirm (budget {}s)",
            lease.chain_id,
            address,
            state.confirmed,
            target,
            self.wait_policy.budget().as_secs()
        );

        let outcome = self
            .wait_policy
            .run(
                |_| async move {
                    let confirmed = rpc
                        .transaction_count(address, BlockTag::Latest)
                        .await
                        .map_err(WaitError::Rpc)?;
                    if confirmed >= target {
                        Ok(())
                    } else {
                        Err(WaitError::StillPending { confirmed })
                    }
                },
                |e| matches!(e, WaitError::StillPending { .. }),
            )
            .await;

        match outcome {
            Ok(()) => self.resolve(lease, rpc).await,
            Err(WaitError::Rpc(e)) => Err(e.into()),
            Err(WaitError::StillPending { confirmed }) => {
                // A locally tracked nonce the node no longer knows about was dropped
                // from the mempool; forget it so the next attempt can reuse it.
                let node_pending = rpc.transaction_count(address, BlockTag::Pending).await?;
                if node_pending <= confirmed && lease.state.high_water.is_some_and(|h| h > confirmed) {
                    warn!(
                        "Chain {} {:?}: tracked nonces above {} vanished from the mempool, resetting",
                        lease.chain_id, address, confirmed
                    );
                    lease.state.high_water = Some(confirmed);
                }
                Err(RelayError::PendingTimeout {
                    chain_id: lease.chain_id,
                    address,
                    waited_secs: self.wait_policy.budget().as_secs(),
                })
            }
        }
    }

    /// Ends the lease, returning an uncommitted shared-store reservation.
    pub async fn release(&self, lease: NonceLease) {
        if let (Some(allocator), Some(reserved), None) = (&self.distributed, lease.reserved, lease.committed) {
            if let Err(e) = allocator.rollback(lease.chain_id, lease.address, reserved).await {
                warn!(
                    "Chain {} {:?}: failed to roll back nonce reservation {}: {}",
                    lease.chain_id, lease.address, reserved, e
                );
            }
        }
    }
}
