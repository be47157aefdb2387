//! Shared key-value store abstraction
//!
//! The idempotency guard and the distributed nonce allocator are the only
//! state shared across relayer workers. Both need atomic primitives from the
//! backing store: set-if-absent with expiry, and compare-and-delete for lock
//! release. [`RedisStore`] serves multi-instance deployments; [`MemoryStore`]
//! serves a single process and tests.

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::RelayError;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl From<StoreError> for RelayError {
    fn from(e: StoreError) -> Self {
        RelayError::Store(e.0)
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Atomically stores `value` only if `key` is absent. Returns whether it was stored.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditional write; `None` means no expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically deletes `key` only if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError>;
}
