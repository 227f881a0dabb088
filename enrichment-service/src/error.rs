use dedupe_guard::DedupeError;
use snapshot_store::SnapshotError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Snapshot store error: {0}")]
    Store(#[from] SnapshotError),

    #[error("Dedupe store error: {0}")]
    Dedupe(#[from] DedupeError),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Channel error: {0}")]
    Channel(String),

    /// Per-item enrichment exceeded its deadline; the item is skipped and
    /// its claim released so a later delivery can retry it.
    #[error("Enrichment timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Catalog(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Channel(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Channel(err.to_string())
    }
}
