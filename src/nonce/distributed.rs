use std::sync::Arc;
use std::time::Duration;

use ethereum_types::H160;
use rand::Rng;
use tracing::debug;

use crate::error::RelayError;
use crate::retry::RetryPolicy;
use crate::store::{KvStore, StoreError};

/// How long a reserved-nonce counter survives without activity.
const NONCE_COUNTER_TTL: Duration = Duration::from_secs(3600);

/// Cross-process nonce allocator on top of a shared [`KvStore`].
///
/// Keys: `nonce_lock:{chain}:{address}` (lock, holder token as value) and
/// `current_nonce:{chain}:{address}` (next nonce to hand out).
pub struct DistributedNonceAllocator {
    store: Arc<dyn KvStore>,
    lock_ttl: Duration,
    lock_policy: RetryPolicy,
}

/// A held lock; only the holder's token can release it.
struct LockGuard {
    key: String,
    token: String,
}

impl DistributedNonceAllocator {
    /// # Arguments
    ///
    /// * `lock_ttl` - Expiry of the lock key, in case the holder dies
    /// * `lock_attempts` - Acquisition attempts, 100ms apart
    pub fn new(store: Arc<dyn KvStore>, lock_ttl: Duration, lock_attempts: u32) -> Self {
        Self { store, lock_ttl, lock_policy: RetryPolicy::new(lock_attempts, Duration::from_millis(100)) }
    }

    pub fn lock_key(chain_id: u64, address: H160) -> String {
        format!("nonce_lock:{}:{:?}", chain_id, address)
    }

    pub fn counter_key(chain_id: u64, address: H160) -> String {
        format!("current_nonce:{}:{:?}", chain_id, address)
    }

    async fn acquire_lock(&self, key: String) -> Result<LockGuard, RelayError> {
        let token = format!("{:032x}", rand::thread_rng().gen::<u128>());
        let store = &self.store;
        let ttl = self.lock_ttl;
        let acquired = self
            .lock_policy
            .run(
                |_| {
                    let (key, token) = (key.clone(), token.clone());
                    async move {
                        match store.set_if_absent(&key, &token, ttl).await {
                            Ok(true) => Ok(()),
                            Ok(false) => Err(None),
                            Err(e) => Err(Some(e)),
                        }
                    }
                },
                |e: &Option<StoreError>| e.is_none(),
            )
            .await;

        match acquired {
            Ok(()) => Ok(LockGuard { key, token }),
            Err(Some(e)) => Err(e.into()),
            Err(None) => Err(RelayError::NonceLockUnavailable(key)),
        }
    }

    async fn release_lock(&self, guard: LockGuard) -> Result<(), RelayError> {
        if !self.store.compare_and_delete(&guard.key, &guard.token).await? {
            debug!("Lock {} expired before release", guard.key);
        }
        Ok(())
    }

    async fn stored_next(&self, counter_key: &str) -> Result<Option<u64>, RelayError> {
        Ok(self.store.get(counter_key).await?.and_then(|v| v.parse().ok()))
    }

    /// Reserves `max(stored counter, floor)` and advances the counter past it.
    pub async fn reserve(&self, chain_id: u64, address: H160, floor: u64) -> Result<u64, RelayError> {
        let guard = self.acquire_lock(Self::lock_key(chain_id, address)).await?;
        let counter_key = Self::counter_key(chain_id, address);

        let result = async {
            let nonce = self.stored_next(&counter_key).await?.unwrap_or(0).max(floor);
            self.store
                .set(&counter_key, &(nonce + 1).to_string(), Some(NONCE_COUNTER_TTL))
                .await?;
            Ok::<u64, RelayError>(nonce)
        }
        .await;

        self.release_lock(guard).await?;
        result
    }

    /// Returns `nonce` to the pool if no later reservation was made.
    pub async fn rollback(&self, chain_id: u64, address: H160, nonce: u64) -> Result<(), RelayError> {
        let guard = self.acquire_lock(Self::lock_key(chain_id, address)).await?;
        let counter_key = Self::counter_key(chain_id, address);

        let result = async {
            if self.stored_next(&counter_key).await? == Some(nonce + 1) {
                self.store.set(&counter_key, &nonce.to_string(), Some(NONCE_COUNTER_TTL)).await?;
            }
            Ok::<(), RelayError>(())
        }
        .await;

        self.release_lock(guard).await?;
        result
    }
}
