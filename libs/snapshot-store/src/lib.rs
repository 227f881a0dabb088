//! Versioned storage of trending window snapshots.
//!
//! The tracker writes one immutable window per poll cycle; the enrichment
//! service reads the latest window at startup to resynchronize. Versions are
//! monotonically increasing integers starting at 1; version 0 means "no data
//! has ever been saved".
//!
//! # Write visibility window
//!
//! `save` is two Redis operations: a single `INCR` that allocates the next
//! version, then the body write under that version. A reader that observes
//! the new version number before the body write lands will get an empty
//! window from `load`. This is benign by contract: a reader that knows a
//! version exists and finds no body retries shortly after instead of
//! treating it as an error. Bodies are immutable once written, so concurrent
//! reads need no locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_schema::RankedRecord;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

mod error;

pub use error::{SnapshotError, SnapshotResult};

const KEY_LATEST_VERSION: &str = "trending:latest_version";

fn window_key(version: u64) -> String {
    format!("trending:window:{}", version)
}

fn meta_key(version: u64) -> String {
    format!("trending:window:{}:meta", version)
}

/// Durable, versioned store of trending windows.
///
/// Implementations must allocate versions with a single atomic
/// read-modify-write so concurrent writers can never mint the same version
/// twice.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Highest version ever allocated, 0 if none.
    async fn latest_version(&self) -> SnapshotResult<u64>;

    /// Allocate `latest + 1` and persist `records` under it.
    async fn save(&self, records: &[RankedRecord], as_of: DateTime<Utc>) -> SnapshotResult<u64>;

    /// Load the window stored under `version`.
    ///
    /// Returns an empty vec for version 0 and for versions whose body is
    /// not (yet) present; neither case is an error.
    async fn load(&self, version: u64) -> SnapshotResult<Vec<RankedRecord>>;
}

/// Redis-backed implementation.
///
/// Layout: `trending:latest_version` holds the version counter,
/// `trending:window:{ver}` the JSON window body, and
/// `trending:window:{ver}:meta` a hash with the `as_of` timestamp.
#[derive(Clone)]
pub struct RedisSnapshotStore {
    conn: ConnectionManager,
}

impl RedisSnapshotStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SnapshotStore for RedisSnapshotStore {
    async fn latest_version(&self) -> SnapshotResult<u64> {
        let mut conn = self.conn.clone();
        let version: Option<u64> = conn.get(KEY_LATEST_VERSION).await?;
        Ok(version.unwrap_or(0))
    }

    async fn save(&self, records: &[RankedRecord], as_of: DateTime<Utc>) -> SnapshotResult<u64> {
        let body = serde_json::to_string(records)?;

        let mut conn = self.conn.clone();
        let version: u64 = conn.incr(KEY_LATEST_VERSION, 1u64).await?;

        // Readers may see `version` from this point until both writes land.
        conn.set::<_, _, ()>(window_key(version), body).await?;
        conn.hset::<_, _, _, ()>(meta_key(version), "as_of", as_of.to_rfc3339())
            .await?;

        debug!(version, records = records.len(), "Saved trending window");
        Ok(version)
    }

    async fn load(&self, version: u64) -> SnapshotResult<Vec<RankedRecord>> {
        if version == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(window_key(version)).await?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => {
                debug!(version, "No window body stored for version");
                Ok(Vec::new())
            }
        }
    }
}

/// In-memory implementation for tests and local development.
///
/// Mirrors the Redis semantics, including the atomic version counter.
#[derive(Default)]
pub struct MemorySnapshotStore {
    counter: AtomicU64,
    windows: Mutex<HashMap<u64, Vec<RankedRecord>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn latest_version(&self) -> SnapshotResult<u64> {
        Ok(self.counter.load(Ordering::SeqCst))
    }

    async fn save(&self, records: &[RankedRecord], _as_of: DateTime<Utc>) -> SnapshotResult<u64> {
        let version = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.insert(version, records.to_vec());
        Ok(version)
    }

    async fn load(&self, version: u64) -> SnapshotResult<Vec<RankedRecord>> {
        if version == 0 {
            return Ok(Vec::new());
        }
        let windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(windows.get(&version).cloned().unwrap_or_default())
    }
}
