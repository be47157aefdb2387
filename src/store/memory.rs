use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{KvStore, StoreError};

/// In-process store with lazy expiry. Single-instance only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_live(entry: &(String, Option<Instant>), now: Instant) -> bool {
    entry.1.map_or(true, |expires_at| expires_at > now)
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| is_live(e, now)) {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), Some(now + ttl)));
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries.get(key).filter(|e| is_live(e, now)).map(|e| e.0.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.lock().await.insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let removed = self.entries.lock().await.remove(key);
        Ok(removed.is_some_and(|e| is_live(&e, now)))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if is_live(entry, now) && entry.0 == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent_respects_ttl() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", "a", Duration::from_secs(10)).await.unwrap());
        assert!(!store.set_if_absent("k", "b", Duration::from_secs(10)).await.unwrap());
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_if_absent("k", "c", Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_delete_only_for_holder() {
        let store = MemoryStore::new();
        store.set("lock", "token-a", None).await.unwrap();
        assert!(!store.compare_and_delete("lock", "token-b").await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("token-a"));
        assert!(store.compare_and_delete("lock", "token-a").await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), None);
    }
}
