//! Per-message statistics.
//!
//! A `MessageStats` record is created when a message is enqueued and is
//! updated on every dequeue and requeue. It is stored as a flat JSON object
//! in the stats table, keyed by the message id text:
//!
//! ```text
//! {"enqueue_time": "...", "last_dequeue_time": null, "dequeue_count": 0,
//!  "last_requeue_time": null, "last_requeue_count": 0}
//! ```
//!
//! # Consistency
//!
//! Updates are read-modify-write round trips against the store. In the
//! default `StatsMode::BestEffort` two consumers touching the same id at
//! the same time can lose an increment. `StatsMode::Locked` serializes
//! updates per id behind a short-lived store lock instead.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// How stats updates are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsMode {
    /// Plain read-modify-write. Concurrent updates of one id may be lost.
    #[default]
    BestEffort,
    /// Read-modify-write under a per-id lock (`SET NX PX` + compare-and-delete).
    Locked,
}

impl std::str::FromStr for StatsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "best_effort" | "best-effort" | "besteffort" => Ok(StatsMode::BestEffort),
            "locked" | "strict" => Ok(StatsMode::Locked),
            other => Err(format!("unknown stats mode '{}'", other)),
        }
    }
}

/// Lock tuning for `StatsMode::Locked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    /// Lock expiry, so a crashed holder cannot wedge the id.
    pub ttl: Duration,
    /// Acquisition attempts before giving up with `LockContention`.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(2000),
            max_attempts: 50,
            retry_delay: Duration::from_millis(10),
        }
    }
}

/// Lifecycle metadata of one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStats {
    pub enqueue_time: DateTime<Utc>,
    pub last_dequeue_time: Option<DateTime<Utc>>,
    pub dequeue_count: u64,
    pub last_requeue_time: Option<DateTime<Utc>>,
    pub last_requeue_count: u64,
}

impl MessageStats {
    /// Fresh record stamped with the current time.
    pub fn new() -> Self {
        Self::enqueued_at(Utc::now())
    }

    pub fn enqueued_at(time: DateTime<Utc>) -> Self {
        Self {
            enqueue_time: time,
            last_dequeue_time: None,
            dequeue_count: 0,
            last_requeue_time: None,
            last_requeue_count: 0,
        }
    }

    pub fn log_dequeue(&mut self) {
        self.log_dequeue_at(Utc::now());
    }

    pub fn log_dequeue_at(&mut self, time: DateTime<Utc>) {
        self.last_dequeue_time = Some(time);
        self.dequeue_count += 1;
    }

    pub fn log_requeue(&mut self) {
        self.log_requeue_at(Utc::now());
    }

    pub fn log_requeue_at(&mut self, time: DateTime<Utc>) {
        self.last_requeue_time = Some(time);
        self.last_requeue_count += 1;
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, QueueError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, QueueError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl Default for MessageStats {
    fn default() -> Self {
        Self::new()
    }
}
