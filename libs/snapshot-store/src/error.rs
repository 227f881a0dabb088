//! Error types for snapshot storage.

use thiserror::Error;

pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Backing store unreachable or a command failed. Callers treat this as
    /// transient: abort the current cycle, retry on the next tick.
    #[error("Snapshot store unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),

    /// Window body failed to (de)serialize.
    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
