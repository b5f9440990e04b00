//! Redis implementation of `KvStore`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::KvStore;
use crate::error::StoreError;

/// Deletes KEYS[1] when it holds ARGV[1]. Returns the number of keys removed.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Redis-backed store.
///
/// Cloning is cheap: clones share the underlying multiplexed connection,
/// which reconnects on its own after a dropped link.
#[derive(Clone)]
pub struct RedisStore {
    redis: ConnectionManager,
}

impl RedisStore {
    /// Connects to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` if the URL is invalid or the server
    /// cannot be reached.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Connection(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        debug!(url = redis_url, "connected to redis");
        Ok(Self { redis })
    }

    /// Wraps an existing connection manager.
    ///
    /// Useful when sharing one connection across several queues.
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

/// IO failures mean the server is unreachable; everything else is a
/// command-level error.
fn classify(err: redis::RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        StoreError::Connection(err.to_string())
    } else {
        StoreError::Command(err)
    }
}

/// PX argument for a TTL. Redis rejects `PX 0`, so sub-millisecond TTLs round up.
fn px_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.redis.clone();
        conn.incr(key, 1u64).await.map_err(classify)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut conn = self.redis.clone();
        conn.rpush(key, value).await.map_err(classify)
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut conn = self.redis.clone();
        conn.lpush(key, value).await.map_err(classify)
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.redis.clone();
        conn.lpop(key, None).await.map_err(classify)
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.redis.clone();
        conn.rpop(key, None).await.map_err(classify)
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.redis.clone();
        conn.llen(key).await.map_err(classify)
    }

    async fn lrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.redis.clone();
        conn.lrange(key, start, stop).await.map_err(classify)
    }

    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        conn.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(classify)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.redis.clone();
        conn.hget(key, field).await.map_err(classify)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.redis.clone();
        let added: usize = conn.sadd(key, member).await.map_err(classify)?;
        Ok(added > 0)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.redis.clone();
        conn.smembers(key).await.map_err(classify)
    }

    async fn scard(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.redis.clone();
        conn.scard(key).await.map_err(classify)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        conn.zadd::<_, _, _, ()>(key, member, score)
            .await
            .map_err(classify)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        let mut conn = self.redis.clone();
        conn.zscore(key, member).await.map_err(classify)
    }

    async fn zcard(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.redis.clone();
        conn.zcard(key).await.map_err(classify)
    }

    async fn del(&self, keys: &[String]) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.redis.clone();
        conn.del(keys).await.map_err(classify)
    }

    async fn set_nx_px(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.redis.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(px_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(reply.is_some())
    }

    async fn del_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.redis.clone();
        let removed: i64 = redis::Script::new(COMPARE_AND_DELETE)
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_px_millis_never_zero() {
        assert_eq!(px_millis(Duration::from_micros(300)), 1);
        assert_eq!(px_millis(Duration::ZERO), 1);
        assert_eq!(px_millis(Duration::from_millis(2000)), 2000);
    }
}
