//! Round-robin distribution pools.
//!
//! A distribution pool is a named set of segment labels stored in the
//! backing store plus a counter. Each call to `next_segment` increments the
//! counter and picks `segments[counter % len]`, so successive calls cycle
//! through the pool.
//!
//! # Index mapping
//!
//! The counter is read *after* the increment. With a fresh counter and a
//! segment snapshot `[a, b, c]` the first three selections are `b`, `c`, `a`.
//!
//! # Fairness under concurrency
//!
//! The counter increment is atomic, but the segment set is materialized into
//! a sequence in a separate round trip. If segments are added while other
//! clients are selecting, two clients may index different snapshots and the
//! distribution becomes uneven for a while. With `SegmentOrder::AsStored` the
//! snapshot order is also whatever the store yields for the set.
//! `SegmentOrder::Sorted` fixes the order of a given membership but does not
//! make selection atomic.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::QueueError;
use crate::keys::KeyNamespace;
use crate::message::MessageId;
use crate::storage::KvStore;

/// How the segment set is turned into an indexable sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentOrder {
    /// Use the order returned by the store.
    #[default]
    AsStored,
    /// Sort the snapshot lexicographically before indexing.
    Sorted,
}

impl std::str::FromStr for SegmentOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "as_stored" | "as-stored" | "stored" => Ok(SegmentOrder::AsStored),
            "sorted" | "strict" => Ok(SegmentOrder::Sorted),
            other => Err(format!("unknown segment order '{}'", other)),
        }
    }
}

/// Name and segments of a pool, as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionPoolConfig {
    pub name: String,
    pub segments: Vec<String>,
}

impl DistributionPoolConfig {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        segments: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.into(),
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Adds every segment to the pool's stored set.
    ///
    /// Set-add is idempotent, so saving twice is harmless. Segments already
    /// stored but not listed here are left in place.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::MalformedIdentifier`, with nothing stored, if a
    /// segment contains `:`.
    pub async fn save(
        &self,
        store: &dyn KvStore,
        keys: &KeyNamespace,
    ) -> Result<usize, QueueError> {
        for segment in &self.segments {
            MessageId::check_segment(segment)?;
        }
        let key = keys.distribution_pool(&self.name);
        let mut added = 0;
        for segment in &self.segments {
            if store.sadd(&key, segment).await? {
                added += 1;
            }
        }
        info!(
            pool = %self.name,
            segments = self.segments.len(),
            added,
            "registered distribution pool"
        );
        Ok(added)
    }
}

/// Handle for selecting segments from a stored pool.
#[derive(Clone)]
pub struct DistributionPool {
    name: String,
    store: Arc<dyn KvStore>,
    keys: KeyNamespace,
    order: SegmentOrder,
}

impl DistributionPool {
    pub fn new(name: impl Into<String>, store: Arc<dyn KvStore>, keys: KeyNamespace) -> Self {
        Self {
            name: name.into(),
            store,
            keys,
            order: SegmentOrder::default(),
        }
    }

    /// Sets how the segment snapshot is ordered before indexing.
    pub fn with_order(mut self, order: SegmentOrder) -> Self {
        self.order = order;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> SegmentOrder {
        self.order
    }

    /// Number of segments currently stored.
    pub async fn size(&self) -> Result<usize, QueueError> {
        Ok(self.store.scard(&self.keys.distribution_pool(&self.name)).await?)
    }

    /// Snapshot of the stored segments in selection order.
    pub async fn segments(&self) -> Result<Vec<String>, QueueError> {
        let mut segments = self
            .store
            .smembers(&self.keys.distribution_pool(&self.name))
            .await?;
        if self.order == SegmentOrder::Sorted {
            segments.sort_unstable();
        }
        Ok(segments)
    }

    /// Returns the next segment in this pool's rotation.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::EmptyPool` if the pool has no segments. The
    /// counter has already been incremented by then.
    pub async fn next_segment(&self) -> Result<String, QueueError> {
        let counter = self
            .store
            .incr(&self.keys.segment_counter(&self.name))
            .await?;
        self.segment_at(counter).await
    }

    /// Segment selected by an arbitrary counter value.
    pub async fn segment_at(&self, counter: u64) -> Result<String, QueueError> {
        let mut segments = self.segments().await?;
        if segments.is_empty() {
            return Err(QueueError::EmptyPool(self.name.clone()));
        }
        let index = (counter % segments.len() as u64) as usize;
        let segment = segments.swap_remove(index);
        debug!(pool = %self.name, counter, index, segment = %segment, "selected segment");
        Ok(segment)
    }
}

impl std::fmt::Debug for DistributionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributionPool")
            .field("name", &self.name)
            .field("prefix", &self.keys.prefix())
            .field("order", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::collections::HashSet;

    async fn saved_pool(segments: &[&str]) -> (Arc<MemoryStore>, DistributionPool) {
        let store = Arc::new(MemoryStore::new());
        let keys = KeyNamespace::new("test");
        DistributionPoolConfig::new("regions", segments.iter().copied())
            .save(store.as_ref(), &keys)
            .await
            .unwrap();
        let pool = DistributionPool::new("regions", store.clone(), keys);
        (store, pool)
    }

    #[tokio::test]
    async fn test_one_full_cycle_visits_each_segment_once() {
        let (_store, pool) = saved_pool(&["a", "b", "c"]).await;

        let picked = vec![
            pool.next_segment().await.unwrap(),
            pool.next_segment().await.unwrap(),
            pool.next_segment().await.unwrap(),
        ];

        // Counter is 1, 2, 3 after each increment: indices 1, 2, 0.
        assert_eq!(picked, vec!["b", "c", "a"]);
        let unique: HashSet<_> = picked.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[tokio::test]
    async fn test_counter_is_persisted() {
        let (store, pool) = saved_pool(&["a", "b"]).await;
        pool.next_segment().await.unwrap();
        pool.next_segment().await.unwrap();

        let other = DistributionPool::new("regions", store.clone(), KeyNamespace::new("test"));
        assert_eq!(other.next_segment().await.unwrap(), "b");
        assert_eq!(store.incr("test_segment_counter_regions").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_empty_pool_fails() {
        let store = Arc::new(MemoryStore::new());
        let pool = DistributionPool::new("nothing", store, KeyNamespace::new("test"));
        assert_eq!(pool.size().await.unwrap(), 0);
        let err = pool.next_segment().await.unwrap_err();
        assert!(matches!(err, QueueError::EmptyPool(ref name) if name == "nothing"));
    }

    #[tokio::test]
    async fn test_save_is_idempotent() {
        let (store, pool) = saved_pool(&["x", "y"]).await;
        let again = DistributionPoolConfig::new("regions", ["x", "y", "z"])
            .save(store.as_ref(), &KeyNamespace::new("test"))
            .await
            .unwrap();
        assert_eq!(again, 1);
        assert_eq!(pool.size().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_save_rejects_segment_with_separator() {
        let store = Arc::new(MemoryStore::new());
        let err = DistributionPoolConfig::new("regions", ["ok", "us:east"])
            .save(store.as_ref(), &KeyNamespace::new("test"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::MalformedIdentifier { .. }));
        assert_eq!(store.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_sorted_order() {
        let (_store, pool) = saved_pool(&["c", "a", "b"]).await;
        let pool = pool.with_order(SegmentOrder::Sorted);
        assert_eq!(pool.segments().await.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(pool.segment_at(3).await.unwrap(), "a");
        assert_eq!(pool.segment_at(5).await.unwrap(), "c");
    }

    #[test]
    fn test_segment_order_parsing() {
        assert_eq!("sorted".parse::<SegmentOrder>(), Ok(SegmentOrder::Sorted));
        assert_eq!("as_stored".parse::<SegmentOrder>(), Ok(SegmentOrder::AsStored));
        assert!("random".parse::<SegmentOrder>().is_err());
    }
}
