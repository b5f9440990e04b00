//! Key-value store abstraction.
//!
//! The queue engine only ever talks to the store through the narrow
//! `KvStore` trait: atomic increment, list push/pop, set membership,
//! sorted-set insertion and hash get/set. Each method is one round trip
//! and is atomic on its own; nothing spans two calls.
//!
//! Two implementations are provided:
//! - **RedisStore**: a Redis server reached through a reconnecting
//!   `ConnectionManager`
//! - **MemoryStore**: an in-process map used as a test double
//!
//! # Usage
//!
//! ```rust,ignore
//! use queue_forge::storage::{KvStore, RedisStore};
//!
//! let store = RedisStore::connect("redis://localhost:6379").await?;
//! let next = store.incr("orders_uuid_counter").await?;
//! ```

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Primitive operations of the backing store.
///
/// Lists hold id strings, hashes hold raw bytes. Semantics follow Redis:
/// missing keys behave as empty structures and a key holding a different
/// kind of value is a `StoreError::WrongType`.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// INCR. Returns the value after the increment; a missing key starts at 0.
    async fn incr(&self, key: &str) -> Result<u64, StoreError>;

    /// RPUSH. Returns the list length after the push.
    async fn rpush(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    /// LPUSH. Returns the list length after the push.
    async fn lpush(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    /// LPOP. `None` when the list is empty or missing.
    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// RPOP. `None` when the list is empty or missing.
    async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn llen(&self, key: &str) -> Result<usize, StoreError>;

    /// LRANGE with inclusive, possibly negative, indices.
    async fn lrange(&self, key: &str, start: isize, stop: isize)
        -> Result<Vec<String>, StoreError>;

    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> Result<(), StoreError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// SADD. Returns whether the member was newly added.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// SMEMBERS. Order is whatever the store yields; callers must not rely on it.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn scard(&self, key: &str) -> Result<usize, StoreError>;

    /// ZADD. Re-adding a member overwrites its score.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError>;

    async fn zcard(&self, key: &str) -> Result<usize, StoreError>;

    /// DEL. Returns how many of the keys existed.
    async fn del(&self, keys: &[String]) -> Result<usize, StoreError>;

    /// SET key value NX PX ttl. Returns whether the key was set.
    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Deletes `key` only if it currently holds `value`.
    async fn del_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError>;
}
