//! Error types for queue-forge operations.
//!
//! Two layers of errors exist:
//! - `StoreError`: failures of a single backing-store primitive
//! - `QueueError`: failures of a queue, pool, or identifier operation
//!
//! Every error is returned to the immediate caller. Nothing in this crate
//! retries on its own; retry and backoff belong to the calling layer.

use thiserror::Error;

/// Errors raised by a `KvStore` primitive.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store command failed: {0}")]
    Command(#[from] redis::RedisError),

    #[error("Increment of '{key}' would overflow")]
    Overflow { key: String },

    #[error("Key '{key}' holds the wrong kind of value for {operation}")]
    WrongType { key: String, operation: &'static str },
}

/// Errors raised by queue engine, distribution pool and identifier operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Malformed message identifier '{input}': {reason}")]
    MalformedIdentifier { input: String, reason: String },

    #[error("Distribution pool '{0}' has no segments")]
    EmptyPool(String),

    #[error("Enqueue to '{list}' failed: store reported {written} items written")]
    Enqueue { list: String, written: usize },

    #[error("Corrupt queue: message {id} has no {missing} entry")]
    CorruptQueue { id: String, missing: &'static str },

    #[error("No {kind} registered under the name '{name}'")]
    MissingRegistration { kind: &'static str, name: String },

    #[error("Store connection failed: {0}")]
    StoreConnection(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Message stats serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Could not lock stats for message {id} after {attempts} attempts")]
    LockContention { id: String, attempts: u32 },
}

impl From<StoreError> for QueueError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection(msg) => QueueError::StoreConnection(msg),
            other => QueueError::Store(other),
        }
    }
}

impl QueueError {
    pub(crate) fn malformed(input: &str, reason: impl Into<String>) -> Self {
        QueueError::MalformedIdentifier {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unregistered_pool(name: &str) -> Self {
        QueueError::MissingRegistration {
            kind: "segment pool",
            name: name.to_string(),
        }
    }
}
