//! queue-forge: distributed work queue over a shared key-value store.
//!
//! Producers and consumers in separate processes share one Redis instance.
//! This crate provides:
//!
//! - **QueueEngine**: enqueue, dequeue, requeue, delayed requeue, undo and purge
//! - **DistributionPool**: round-robin segment selection for partitioned work
//! - **MessageId**: compound `msg:<counter>:<segment>` identifiers
//! - **MessageStats**: per-message delivery bookkeeping
//! - **KvStore**: the narrow store interface, with Redis and in-memory backends
//!
//! # Example
//!
//! ```rust,ignore
//! use queue_forge::{QueueConfig, QueueEngine};
//!
//! let config = QueueConfig::from_yaml_file("queue.yaml")?;
//! let queue = QueueEngine::connect(config).await?;
//! queue.register_pools().await?;
//!
//! let id = queue.enqueue_to_pool("order-123", "regions").await?;
//! if let Some(msg) = queue.dequeue(None).await? {
//!     // process msg.payload, then requeue on failure
//!     queue.requeue(&msg.id).await?;
//! }
//! ```

pub mod config;
pub mod error;
pub mod keys;
pub mod logging;
pub mod message;
pub mod pool;
pub mod queue;
pub mod stats;
pub mod storage;

// Re-export commonly used types
pub use config::{ConfigError, QueueConfig};
pub use error::{QueueError, StoreError};
pub use keys::{KeyNamespace, Structure};
pub use message::{Message, MessageId};
pub use pool::{DistributionPool, DistributionPoolConfig, SegmentOrder};
pub use queue::{QueueEngine, QueueSnapshot};
pub use stats::{LockSettings, MessageStats, StatsMode};
pub use storage::{KvStore, MemoryStore, RedisStore};
