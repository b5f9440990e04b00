//! Redis-backed work queue engine.
//!
//! # Queue Structure
//!
//! A queue is a handful of store structures derived from one prefix (see
//! [`KeyNamespace`]):
//!
//! - pending list: ids waiting for delivery, consumed from the head
//! - working list: ids handed to a consumer, most recent at the head
//! - values table: id -> payload
//! - delayed set: ids scheduled for re-delivery, scored by delay
//! - stats table: id -> [`MessageStats`]
//!
//! # Lifecycle
//!
//! ```text
//! enqueue ──► PENDING ──dequeue──► WORKING ──requeue──────────► PENDING
//!                                     └─────requeue_with_delay──► DELAYED
//! ```
//!
//! There is no acknowledgement and no per-message delete: a payload stays
//! in the values table until [`QueueEngine::purge`]. Moving ids from the
//! delayed set back to the pending list is left to an external sweeper.
//!
//! # Consistency
//!
//! Every store primitive is atomic on its own; operations made of several
//! primitives are not. In particular the stats update on dequeue/requeue
//! is a read-modify-write, and in `StatsMode::BestEffort` concurrent updates
//! of the same id can lose increments. `StatsMode::Locked` is the opt-in
//! alternative. Dequeue never blocks; polling and backoff are up to the
//! caller, as are retries.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::keys::KeyNamespace;
use crate::message::{Message, MessageId};
use crate::pool::{DistributionPool, DistributionPoolConfig};
use crate::stats::{MessageStats, StatsMode};
use crate::storage::{KvStore, RedisStore};

/// Counts of ids in each queue structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Key prefix of the queue.
    pub prefix: String,
    /// Ids waiting for delivery.
    pub pending: usize,
    /// Ids handed out to consumers.
    pub working: usize,
    /// Ids waiting in the delayed set.
    pub delayed: usize,
}

impl QueueSnapshot {
    /// Total entries across all structures. An id can be counted twice
    /// once it has been requeued, since working entries are never removed.
    pub fn total(&self) -> usize {
        self.pending + self.working + self.delayed
    }
}

/// Work queue over a shared key-value store.
pub struct QueueEngine {
    store: Arc<dyn KvStore>,
    keys: KeyNamespace,
    config: QueueConfig,
}

impl QueueEngine {
    /// Creates an engine over an existing store handle.
    pub fn new(store: Arc<dyn KvStore>, config: QueueConfig) -> Self {
        Self {
            store,
            keys: KeyNamespace::new(config.prefix.clone()),
            config,
        }
    }

    /// Connects to the Redis server named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::StoreConnection` if the server cannot be reached.
    pub async fn connect(config: QueueConfig) -> Result<Self, QueueError> {
        let store = RedisStore::connect(&config.redis_url()).await?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn keys(&self) -> &KeyNamespace {
        &self.keys
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Allocates the next message id.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::MalformedIdentifier`, without touching the
    /// counter, if the segment contains `:`.
    pub async fn next_id(&self, segment: Option<&str>) -> Result<MessageId, QueueError> {
        if let Some(segment) = segment {
            MessageId::check_segment(segment)?;
        }
        let counter = self.store.incr(&self.keys.id_counter()).await?;
        Ok(MessageId::new(counter, segment))
    }

    /// Adds a payload to the tail of the pending list.
    ///
    /// The payload and a fresh stats record are written before the id is
    /// pushed, so a consumer never pops an id whose entries do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Enqueue` if the push reports no items written, and
    /// `QueueError::MalformedIdentifier` before any write if the segment
    /// contains `:`.
    pub async fn enqueue(
        &self,
        payload: impl AsRef<[u8]>,
        segment: Option<&str>,
    ) -> Result<MessageId, QueueError> {
        let id = self.next_id(segment).await?;
        let key = id.encode();

        self.store
            .hset(&self.keys.values_table(), &key, payload.as_ref())
            .await?;
        self.store
            .hset(&self.keys.stats_table(), &key, &MessageStats::new().to_bytes()?)
            .await?;

        let pending = self.keys.pending_list();
        let written = self.store.rpush(&pending, &key).await?;
        if written < 1 {
            return Err(QueueError::Enqueue {
                list: pending,
                written,
            });
        }

        debug!(id = %key, pending = written, "enqueued message");
        Ok(id)
    }

    /// Enqueues with the next segment drawn from a registered pool.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::MissingRegistration` for an unknown pool and
    /// `QueueError::EmptyPool` if the pool has no stored segments.
    pub async fn enqueue_to_pool(
        &self,
        payload: impl AsRef<[u8]>,
        pool_name: &str,
    ) -> Result<MessageId, QueueError> {
        let segment = self.pool(pool_name)?.next_segment().await?;
        self.enqueue(payload, Some(&segment)).await
    }

    /// Takes the message at the head of the pending list.
    ///
    /// Returns `Ok(None)` right away when the list is empty. The id is
    /// pushed onto the head of the working list and its dequeue count is
    /// incremented; the payload stays in the values table.
    ///
    /// There is a single pending list, so `segment` does not narrow the
    /// selection.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::CorruptQueue` if the popped id has no stats or
    /// payload entry.
    pub async fn dequeue(&self, segment: Option<&str>) -> Result<Option<Message>, QueueError> {
        let Some(key) = self.store.lpop(&self.keys.pending_list()).await? else {
            return Ok(None);
        };

        // Unparseable ids stay on the working list for inspection.
        self.store.lpush(&self.keys.working_set(), &key).await?;
        let id = MessageId::parse(&key)?;

        let stats = self.update_stats(&key, MessageStats::log_dequeue).await?;
        let payload = self.load_payload(&key).await?;

        debug!(
            id = %key,
            requested_segment = segment.unwrap_or(""),
            dequeue_count = stats.dequeue_count,
            "dequeued message"
        );
        Ok(Some(Message::new(id, payload)))
    }

    /// Puts an id back on the tail of the pending list.
    pub async fn requeue(&self, id: &MessageId) -> Result<(), QueueError> {
        let key = id.encode();
        self.store.rpush(&self.keys.pending_list(), &key).await?;

        let stats = self.update_stats(&key, MessageStats::log_requeue).await?;
        debug!(id = %key, requeue_count = stats.last_requeue_count, "requeued message");
        Ok(())
    }

    /// Schedules an id for later re-delivery.
    ///
    /// The id is added to the delayed set with `delay_millis` as its score.
    /// The score is a relative offset, not a due time: a sweeper promoting
    /// ids back to pending should add it to the `last_requeue_time` in the
    /// message's stats. The id is not removed from the pending or working
    /// list.
    pub async fn requeue_with_delay(
        &self,
        id: &MessageId,
        delay_millis: u64,
    ) -> Result<(), QueueError> {
        let key = id.encode();
        self.store
            .zadd(&self.keys.delayed_set(), &key, delay_millis as f64)
            .await?;

        let stats = self.update_stats(&key, MessageStats::log_requeue).await?;
        debug!(
            id = %key,
            delay_millis,
            requeue_count = stats.last_requeue_count,
            "requeued message with delay"
        );
        Ok(())
    }

    /// Pops the most recently enqueued id from the tail of the pending list.
    ///
    /// Undoes the last enqueue. Meant for tests and compensation only: the
    /// working list and stats are left untouched.
    pub async fn remove_most_recent(&self) -> Result<Option<Message>, QueueError> {
        let Some(key) = self.store.rpop(&self.keys.pending_list()).await? else {
            return Ok(None);
        };
        let id = match MessageId::parse(&key) {
            Ok(id) => id,
            Err(e) => {
                warn!(id = %key, "malformed id at pending tail, putting it back");
                self.store.rpush(&self.keys.pending_list(), &key).await?;
                return Err(e);
            }
        };
        let payload = self.load_payload(&key).await?;

        debug!(id = %key, "removed most recently queued message");
        Ok(Some(Message::new(id, payload)))
    }

    /// Deletes the pending list, working list, values table, delayed set and
    /// stats table. Irreversible.
    ///
    /// The id counter and pool keys are kept, so ids stay unique across purges.
    pub async fn purge(&self) -> Result<(), QueueError> {
        let removed = self.store.del(&self.keys.queue_wide_keys()).await?;
        info!(prefix = %self.keys.prefix(), removed, "purged queue");
        Ok(())
    }

    /// Length of the pending list.
    pub async fn count(&self) -> Result<usize, QueueError> {
        Ok(self.store.llen(&self.keys.pending_list()).await?)
    }

    /// Length of the working list.
    pub async fn working_count(&self) -> Result<usize, QueueError> {
        Ok(self.store.llen(&self.keys.working_set()).await?)
    }

    /// Number of ids in the delayed set.
    pub async fn delayed_count(&self) -> Result<usize, QueueError> {
        Ok(self.store.zcard(&self.keys.delayed_set()).await?)
    }

    /// Delay score recorded for an id, if it is in the delayed set.
    pub async fn delayed_score(&self, id: &MessageId) -> Result<Option<f64>, QueueError> {
        Ok(self
            .store
            .zscore(&self.keys.delayed_set(), &id.encode())
            .await?)
    }

    /// Ids currently in the working list, most recently dequeued first.
    pub async fn working_ids(&self) -> Result<Vec<MessageId>, QueueError> {
        self.store
            .lrange(&self.keys.working_set(), 0, -1)
            .await?
            .iter()
            .map(|key| MessageId::parse(key))
            .collect()
    }

    /// Stats of a message, if it has a record.
    pub async fn message_stats(&self, id: &MessageId) -> Result<Option<MessageStats>, QueueError> {
        match self
            .store
            .hget(&self.keys.stats_table(), &id.encode())
            .await?
        {
            Some(bytes) => Ok(Some(MessageStats::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Counts of every structure.
    pub async fn snapshot(&self) -> Result<QueueSnapshot, QueueError> {
        let (pending, working, delayed) =
            tokio::try_join!(self.count(), self.working_count(), self.delayed_count())?;

        Ok(QueueSnapshot {
            prefix: self.keys.prefix().to_string(),
            pending,
            working,
            delayed,
        })
    }

    /// Handle for a pool declared in the configuration.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::MissingRegistration` if no pool has that name.
    pub fn pool(&self, name: &str) -> Result<DistributionPool, QueueError> {
        if !self.config.distribution_pools.contains_key(name) {
            return Err(QueueError::unregistered_pool(name));
        }
        Ok(
            DistributionPool::new(name, self.store.clone(), self.keys.clone())
                .with_order(self.config.segment_order),
        )
    }

    /// Writes the segments of every configured pool to the store.
    ///
    /// Returns the number of segments that were not stored before.
    pub async fn register_pools(&self) -> Result<usize, QueueError> {
        let mut added = 0;
        for pool in self.config.pool_configs() {
            added += pool.save(self.store.as_ref(), &self.keys).await?;
        }
        Ok(added)
    }

    /// Stores one pool and adds it to this engine's registrations.
    pub async fn register_pool(
        &mut self,
        pool: DistributionPoolConfig,
    ) -> Result<usize, QueueError> {
        let added = pool.save(self.store.as_ref(), &self.keys).await?;
        self.config
            .distribution_pools
            .insert(pool.name, pool.segments);
        Ok(added)
    }

    async fn load_payload(&self, key: &str) -> Result<Vec<u8>, QueueError> {
        self.store
            .hget(&self.keys.values_table(), key)
            .await?
            .ok_or_else(|| {
                warn!(id = %key, "message has no payload");
                QueueError::CorruptQueue {
                    id: key.to_string(),
                    missing: "payload",
                }
            })
    }

    /// Applies `apply` to the stored stats of `key` according to the stats mode.
    async fn update_stats<F>(&self, key: &str, apply: F) -> Result<MessageStats, QueueError>
    where
        F: FnOnce(&mut MessageStats) + Send,
    {
        match self.config.stats_mode {
            StatsMode::BestEffort => self.read_modify_write(key, apply).await,
            StatsMode::Locked => {
                let lock_key = self.keys.stats_lock(key);
                let token = self.acquire_lock(&lock_key, key).await?;
                let result = self.read_modify_write(key, apply).await;
                match self.store.del_if_equals(&lock_key, &token).await {
                    Ok(true) => {}
                    Ok(false) => warn!(id = %key, "stats lock expired before release"),
                    Err(e) => warn!(id = %key, error = %e, "failed to release stats lock"),
                }
                result
            }
        }
    }

    async fn read_modify_write<F>(&self, key: &str, apply: F) -> Result<MessageStats, QueueError>
    where
        F: FnOnce(&mut MessageStats) + Send,
    {
        let table = self.keys.stats_table();
        let bytes = self.store.hget(&table, key).await?.ok_or_else(|| {
            warn!(id = %key, "message has no stats record");
            QueueError::CorruptQueue {
                id: key.to_string(),
                missing: "stats",
            }
        })?;

        let mut stats = MessageStats::from_bytes(&bytes)?;
        apply(&mut stats);
        self.store.hset(&table, key, &stats.to_bytes()?).await?;
        Ok(stats)
    }

    async fn acquire_lock(&self, lock_key: &str, id: &str) -> Result<String, QueueError> {
        let settings = self.config.lock;
        let token = Uuid::new_v4().to_string();

        for attempt in 1..=settings.max_attempts {
            if self
                .store
                .set_nx_px(lock_key, &token, settings.ttl)
                .await?
            {
                return Ok(token);
            }
            if attempt < settings.max_attempts {
                tokio::time::sleep(settings.retry_delay).await;
            }
        }

        warn!(id = %id, attempts = settings.max_attempts, "stats lock contention");
        Err(QueueError::LockContention {
            id: id.to_string(),
            attempts: settings.max_attempts,
        })
    }
}

impl std::fmt::Debug for QueueEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEngine")
            .field("keys", &self.keys)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::LockSettings;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn engine_with(config: QueueConfig) -> (Arc<MemoryStore>, QueueEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = QueueEngine::new(store.clone(), config);
        (store, engine)
    }

    fn engine() -> (Arc<MemoryStore>, QueueEngine) {
        engine_with(QueueConfig::new("test"))
    }

    #[tokio::test]
    async fn test_count_matches_enqueues_after_purge() {
        let (_store, queue) = engine();
        queue.enqueue("stale", None).await.unwrap();
        queue.purge().await.unwrap();

        for i in 0..7 {
            queue.enqueue(format!("job-{}", i), None).await.unwrap();
        }
        assert_eq!(queue.count().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_order_scenario() {
        let (_store, queue) = engine();

        let id = queue.enqueue("order-123", None).await.unwrap();
        assert_eq!(id.encode(), "msg:1:");

        let msg = queue.dequeue(None).await.unwrap().expect("message");
        assert_eq!(msg.id, id);
        assert_eq!(msg.payload_str(), Some("order-123"));

        let stats = queue.message_stats(&id).await.unwrap().expect("stats");
        assert_eq!(stats.dequeue_count, 1);
        assert!(stats.last_dequeue_time.is_some());

        assert!(queue.dequeue(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dequeue_empty_returns_none() {
        let (_store, queue) = engine();
        assert!(queue.dequeue(None).await.unwrap().is_none());
        assert_eq!(queue.working_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fifo_and_working_list() {
        let (_store, queue) = engine();
        let first = queue.enqueue("a", None).await.unwrap();
        let second = queue.enqueue("b", Some("east")).await.unwrap();
        assert_eq!(second.encode(), "msg:2:east");

        assert_eq!(queue.dequeue(None).await.unwrap().unwrap().id, first);
        let msg = queue.dequeue(None).await.unwrap().unwrap();
        assert_eq!(msg.id.segment(), Some("east"));

        assert_eq!(queue.working_ids().await.unwrap(), vec![second, first]);
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_requeue_appends_and_tracks_stats() {
        let (_store, queue) = engine();
        let id = queue.enqueue("retry-me", None).await.unwrap();
        queue.enqueue("other", None).await.unwrap();
        queue.dequeue(None).await.unwrap();

        queue.requeue(&id).await.unwrap();
        assert_eq!(queue.count().await.unwrap(), 2);

        let stats = queue.message_stats(&id).await.unwrap().unwrap();
        assert_eq!(stats.last_requeue_count, 1);
        assert!(stats.last_requeue_time.is_some());

        // Requeued id sits behind the message that was already pending.
        assert_eq!(queue.dequeue(None).await.unwrap().unwrap().payload_str(), Some("other"));
        let again = queue.dequeue(None).await.unwrap().unwrap();
        assert_eq!(again.id, id);
        let stats = queue.message_stats(&id).await.unwrap().unwrap();
        assert_eq!(stats.dequeue_count, 2);
    }

    #[tokio::test]
    async fn test_requeue_with_delay_only_touches_delayed_set() {
        let (_store, queue) = engine();
        let id = queue.enqueue("later", None).await.unwrap();
        queue.dequeue(None).await.unwrap();

        queue.requeue_with_delay(&id, 5000).await.unwrap();

        assert_eq!(queue.delayed_score(&id).await.unwrap(), Some(5000.0));
        assert_eq!(queue.count().await.unwrap(), 0);
        assert_eq!(queue.working_ids().await.unwrap(), vec![id.clone()]);

        let stats = queue.message_stats(&id).await.unwrap().unwrap();
        assert_eq!(stats.last_requeue_count, 1);

        let snapshot = queue.snapshot().await.unwrap();
        assert_eq!(
            snapshot,
            QueueSnapshot {
                prefix: "test".to_string(),
                pending: 0,
                working: 1,
                delayed: 1,
            }
        );
        assert_eq!(snapshot.total(), 2);
    }

    #[tokio::test]
    async fn test_requeue_with_delay_leaves_pending_entry() {
        let (_store, queue) = engine();
        let id = queue.enqueue("still-pending", None).await.unwrap();
        queue.requeue_with_delay(&id, 250).await.unwrap();
        assert_eq!(queue.count().await.unwrap(), 1);
        assert_eq!(queue.delayed_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_most_recent() {
        let (_store, queue) = engine();
        let id = queue.enqueue("keep", None).await.unwrap();
        let last = queue.enqueue("undo", None).await.unwrap();

        let removed = queue.remove_most_recent().await.unwrap().unwrap();
        assert_eq!(removed.id, last);
        assert_eq!(removed.payload_str(), Some("undo"));
        assert_eq!(queue.count().await.unwrap(), 1);
        assert_eq!(queue.working_count().await.unwrap(), 0);

        let stats = queue.message_stats(&last).await.unwrap().unwrap();
        assert_eq!(stats.dequeue_count, 0);

        queue.remove_most_recent().await.unwrap();
        assert!(queue.remove_most_recent().await.unwrap().is_none());
        assert!(queue.message_stats(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_keeps_counter() {
        let (store, queue) = engine();
        let id = queue.enqueue("x", None).await.unwrap();
        queue.dequeue(None).await.unwrap();
        queue.requeue_with_delay(&id, 10).await.unwrap();

        queue.purge().await.unwrap();
        assert_eq!(store.key_count().await, 1);
        assert!(store.exists("test_uuid_counter").await);

        let next = queue.enqueue("y", None).await.unwrap();
        assert_eq!(next.counter(), 2);
    }

    #[tokio::test]
    async fn test_dequeue_missing_stats_is_corrupt() {
        let (store, queue) = engine();
        store.rpush("test_pending_list", "msg:9:").await.unwrap();
        store.hset("test_values_table", "msg:9:", b"orphan").await.unwrap();

        let err = queue.dequeue(None).await.unwrap_err();
        assert!(matches!(err, QueueError::CorruptQueue { missing: "stats", .. }));
    }

    #[tokio::test]
    async fn test_dequeue_missing_payload_is_corrupt() {
        let (store, queue) = engine();
        store.rpush("test_pending_list", "msg:9:").await.unwrap();
        let stats = MessageStats::new().to_bytes().unwrap();
        store.hset("test_msg_stats_table", "msg:9:", &stats).await.unwrap();

        let err = queue.dequeue(None).await.unwrap_err();
        assert!(matches!(err, QueueError::CorruptQueue { missing: "payload", .. }));
    }

    #[tokio::test]
    async fn test_dequeue_malformed_id() {
        let (store, queue) = engine();
        store.rpush("test_pending_list", "msg:1:a:b").await.unwrap();
        let err = queue.dequeue(None).await.unwrap_err();
        assert!(matches!(err, QueueError::MalformedIdentifier { .. }));
        assert_eq!(
            store.lrange("test_working_set", 0, -1).await.unwrap(),
            vec!["msg:1:a:b"]
        );
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_most_recent_malformed_id_is_kept() {
        let (store, queue) = engine();
        queue.enqueue("first", None).await.unwrap();
        store.rpush("test_pending_list", "msg:x:").await.unwrap();

        let err = queue.remove_most_recent().await.unwrap_err();
        assert!(matches!(err, QueueError::MalformedIdentifier { .. }));
        assert_eq!(
            store.lrange("test_pending_list", 0, -1).await.unwrap(),
            vec!["msg:1:", "msg:x:"]
        );
    }

    #[tokio::test]
    async fn test_enqueue_rejects_segment_with_separator() {
        let (store, queue) = engine();
        let err = queue.enqueue("payload", Some("a:b")).await.unwrap_err();
        assert!(matches!(err, QueueError::MalformedIdentifier { .. }));

        // Nothing written, not even the id counter.
        assert_eq!(store.key_count().await, 0);
        assert!(queue.dequeue(None).await.unwrap().is_none());

        let id = queue.enqueue("payload", Some("a")).await.unwrap();
        assert_eq!(id.encode(), "msg:1:a");
    }

    #[tokio::test]
    async fn test_register_pool_rejects_segment_with_separator() {
        let (_store, mut queue) = engine();
        let err = queue
            .register_pool(DistributionPoolConfig::new("bad", ["a:b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::MalformedIdentifier { .. }));
        assert!(queue.pool("bad").is_err());
    }

    #[tokio::test]
    async fn test_requeue_unknown_id_is_corrupt() {
        let (_store, queue) = engine();
        let err = queue
            .requeue(&MessageId::unsegmented(404))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::CorruptQueue { .. }));
    }

    #[tokio::test]
    async fn test_store_type_clash_surfaces_as_store_error() {
        let (store, queue) = engine();
        store.sadd("test_pending_list", "oops").await.unwrap();
        let err = queue.enqueue("x", None).await.unwrap_err();
        assert!(matches!(err, QueueError::Store(_)));
    }

    #[tokio::test]
    async fn test_unregistered_pool() {
        let (_store, queue) = engine();
        let err = queue.enqueue_to_pool("x", "nowhere").await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::MissingRegistration { kind: "segment pool", .. }
        ));
        assert!(queue.pool("nowhere").is_err());
    }

    #[tokio::test]
    async fn test_enqueue_to_pool_rotates_segments() {
        let config = QueueConfig::new("test").with_pool("regions", ["a", "b", "c"]);
        let (_store, queue) = engine_with(config);
        assert_eq!(queue.register_pools().await.unwrap(), 3);

        let mut segments = Vec::new();
        for i in 0..4 {
            let id = queue.enqueue_to_pool(format!("p{}", i), "regions").await.unwrap();
            segments.push(id.segment().map(str::to_string));
        }
        let segments: Vec<_> = segments.into_iter().flatten().collect();
        assert_eq!(segments, vec!["b", "c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_registered_but_empty_pool() {
        let config = QueueConfig::new("test").with_pool("empty", Vec::<String>::new());
        let (_store, queue) = engine_with(config);
        let err = queue.enqueue_to_pool("x", "empty").await.unwrap_err();
        assert!(matches!(err, QueueError::EmptyPool(_)));
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_register_pool_at_runtime() {
        let (_store, mut queue) = engine();
        let added = queue
            .register_pool(DistributionPoolConfig::new("late", ["x"]))
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(queue.pool("late").unwrap().next_segment().await.unwrap(), "x");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_locked_stats_mode_keeps_every_requeue() {
        let lock = LockSettings {
            ttl: Duration::from_secs(5),
            max_attempts: 10_000,
            retry_delay: Duration::from_millis(1),
        };
        let config = QueueConfig::new("test")
            .with_stats_mode(StatsMode::Locked)
            .with_lock_settings(lock);
        let (store, queue) = engine_with(config);
        let queue = Arc::new(queue);
        let id = queue.enqueue("contended", None).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let queue = queue.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move { queue.requeue(&id).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stats = queue.message_stats(&id).await.unwrap().unwrap();
        assert_eq!(stats.last_requeue_count, 16);
        assert_eq!(queue.count().await.unwrap(), 17);
        assert!(!store.exists("test_msg_stats_lock_msg:1:").await);
    }

    #[tokio::test]
    async fn test_locked_stats_mode_reports_contention() {
        let lock = LockSettings {
            ttl: Duration::from_secs(5),
            max_attempts: 2,
            retry_delay: Duration::from_millis(1),
        };
        let config = QueueConfig::new("test")
            .with_stats_mode(StatsMode::Locked)
            .with_lock_settings(lock);
        let (store, queue) = engine_with(config);
        let id = queue.enqueue("held", None).await.unwrap();

        store
            .set_nx_px("test_msg_stats_lock_msg:1:", "someone-else", Duration::from_secs(5))
            .await
            .unwrap();

        let err = queue.requeue(&id).await.unwrap_err();
        assert!(matches!(err, QueueError::LockContention { attempts: 2, .. }));
    }
}
