use snapshot_store::SnapshotError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Fetching the ranked list failed. Transient: skip the cycle.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Snapshot store unreachable or misbehaving. Transient: skip the cycle.
    #[error("Snapshot store error: {0}")]
    Store(#[from] SnapshotError),

    /// Publishing an event failed. The event is lost; the next resync or
    /// diff covers it. Never escalated past a warning.
    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Provider(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Publish(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Publish(err.to_string())
    }
}
