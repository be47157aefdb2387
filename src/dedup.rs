//! Idempotency Guard
//!
//! Suppresses duplicate processing of the same deposit when webhooks or
//! pollers deliver it more than once. An entry expires on its own after the
//! TTL so a later legitimate retry of a failed fill is not blocked forever.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ethereum_types::H256;
use lru::LruCache;
use tokio::time::Instant;
use tracing::debug;

use crate::error::RelayError;
use crate::store::KvStore;

pub const DEDUP_KEY_PREFIX: &str = "processed_deposit:";
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(120);

const SENTINEL: &str = "1";

enum Backend {
    /// Shared across instances
    Store(Arc<dyn KvStore>),
    /// Single-process substitute, bounded to the N most recent keys
    Lru(Mutex<LruCache<String, Instant>>),
}

pub struct IdempotencyGuard {
    backend: Backend,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn with_store(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { backend: Backend::Store(store), ttl }
    }

    pub fn in_process(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { backend: Backend::Lru(Mutex::new(LruCache::new(capacity))), ttl }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.backend, Backend::Store(_))
    }

    pub fn key(deposit_hash: H256) -> String {
        format!("{}{:?}", DEDUP_KEY_PREFIX, deposit_hash)
    }

    /// Records `deposit_hash` if it has not been seen within the TTL.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - First sighting, proceed
    /// * `Ok(false)` - Duplicate, short-circuit
    pub async fn mark_if_new(&self, deposit_hash: H256) -> Result<bool, RelayError> {
        let key = Self::key(deposit_hash);
        let is_new = match &self.backend {
            Backend::Store(store) => store.set_if_absent(&key, SENTINEL, self.ttl).await?,
            Backend::Lru(cache) => {
                let now = Instant::now();
                let mut cache = cache
                    .lock()
                    .map_err(|_| RelayError::Store("dedup cache lock poisoned".to_string()))?;
                match cache.get(&key) {
                    Some(expires_at) if *expires_at > now => false,
                    _ => {
                        cache.put(key.clone(), now + self.ttl);
                        true
                    }
                }
            }
        };
        if !is_new {
            debug!("Duplicate deposit {} within {}s window", key, self.ttl.as_secs());
        }
        Ok(is_new)
    }
}
