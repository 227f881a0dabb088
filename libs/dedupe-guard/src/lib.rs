//! TTL-bounded dedupe records for at-most-once-in-principle event handling.
//!
//! Consumers claim an event id before working on it and commit it only after
//! the work succeeds. Records expire after a configurable TTL, so the
//! guarantee is best-effort rather than authoritative: an event can be
//! reprocessed after expiry, after a release, or if the record store is
//! lost. Downstream writes must therefore be idempotent regardless.
//!
//! State machine per event id:
//!
//! ```text
//! NEW --try_claim--> CLAIMED --mark_done--> DONE (expires after TTL)
//!                       |
//!                    release (work failed; id becomes NEW again)
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

mod error;
mod redis_store;

pub use error::{DedupeError, DedupeResult};
pub use redis_store::RedisDedupeStore;

/// Outcome of attempting to claim an event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Id was new; caller now owns the in-flight claim.
    Claimed,
    /// Another worker holds an unexpired claim; skip, it may still succeed.
    InFlight,
    /// Id was already processed to completion within the TTL.
    Done,
}

impl ClaimOutcome {
    /// Whether the caller should proceed with processing.
    pub fn should_process(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed)
    }
}

/// Short-lived claim/commit records keyed by event id.
#[async_trait]
pub trait DedupeStore: Send + Sync {
    /// Atomically claim `event_id` if it is not already claimed or done.
    async fn try_claim(&self, event_id: &str) -> DedupeResult<ClaimOutcome>;

    /// Mark a claimed id as successfully processed. Refreshes the TTL so
    /// late duplicate deliveries within the window are still suppressed.
    async fn mark_done(&self, event_id: &str) -> DedupeResult<()>;

    /// Drop the claim after failed processing so a redelivery (or retry)
    /// can pick the event up again before the TTL would have expired.
    async fn release(&self, event_id: &str) -> DedupeResult<()>;
}

/// In-memory implementation for tests and local development.
pub struct MemoryDedupeStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, (EntryState, Instant)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Claimed,
    Done,
}

impl MemoryDedupeStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl DedupeStore for MemoryDedupeStore {
    async fn try_claim(&self, event_id: &str) -> DedupeResult<ClaimOutcome> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, (_, expires)| *expires > now);

        match entries.get(event_id) {
            Some((EntryState::Done, _)) => Ok(ClaimOutcome::Done),
            Some((EntryState::Claimed, _)) => Ok(ClaimOutcome::InFlight),
            None => {
                entries.insert(
                    event_id.to_string(),
                    (EntryState::Claimed, now + self.ttl),
                );
                debug!(event_id, "Claimed event");
                Ok(ClaimOutcome::Claimed)
            }
        }
    }

    async fn mark_done(&self, event_id: &str) -> DedupeResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            event_id.to_string(),
            (EntryState::Done, Instant::now() + self.ttl),
        );
        Ok(())
    }

    async fn release(&self, event_id: &str) -> DedupeResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(event_id);
        Ok(())
    }
}
