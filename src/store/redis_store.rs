use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Script};

use super::{KvStore, StoreError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deletes KEYS[1] only if it holds ARGV[1]; returns the number of keys removed.
const COMPARE_AND_DELETE_LUA: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

/// Redis-backed store shared by all relayer instances.
pub struct RedisStore {
    conn: ConnectionManager,
    compare_and_delete: Script,
}

impl RedisStore {
    /// Connects through a `ConnectionManager`, which reconnects on its own.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(redis_error)?;
        let conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError(format!("timed out connecting to redis at {}", redis_url)))?
            .map_err(redis_error)?;
        Ok(Self { conn, compare_and_delete: Script::new(COMPARE_AND_DELETE_LUA) })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

fn redis_error(e: redis::RedisError) -> StoreError {
    StoreError(format!("redis: {}", e))
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn();
        conn.get(key).await.map_err(redis_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl)).await,
            None => conn.set::<_, _, ()>(key, value).await,
        }
        .map_err(redis_error)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let removed: i64 = conn.del(key).await.map_err(redis_error)?;
        Ok(removed > 0)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let mut invocation = self.compare_and_delete.key(key);
        invocation.arg(expected);
        let removed: i64 = conn.invoke_script(&invocation).await.map_err(redis_error)?;
        Ok(removed > 0)
    }
}
