//! Error types for dedupe record stores.

use thiserror::Error;

pub type DedupeResult<T> = Result<T, DedupeError>;

#[derive(Error, Debug)]
pub enum DedupeError {
    /// Record store unreachable or a command failed. Dedupe is best-effort;
    /// callers decide whether to process anyway or skip the event.
    #[error("Dedupe store unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),
}
