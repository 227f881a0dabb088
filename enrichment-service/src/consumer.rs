//! Change-event consumer.
//!
//! Startup order matters: a full resync against the latest snapshot runs
//! first, then the channel subscription starts. Events published during the
//! resync are missed by design; the channel gives no delivery guarantee
//! anywhere else either, and the next resync covers every gap.
//!
//! Per-event flow is NEW -> CLAIMED -> DONE. The claim is taken before work
//! starts so concurrent duplicate deliveries collapse to one worker, but
//! DONE is recorded only after the catalog upsert succeeds: a failed
//! attempt releases the claim so a redelivery can retry before the dedupe
//! TTL would have expired.

use crate::catalog::{Catalog, TokenUpsert};
use crate::config::Config;
use crate::error::{AppError, Result};
use dedupe_guard::{ClaimOutcome, DedupeStore};
use event_schema::{ChangeEvent, ChangeType};
use futures_util::StreamExt;
use snapshot_store::SnapshotStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// How long to wait between retries when the latest version is allocated
/// but its body has not landed yet (the benign save-visibility window).
const RESYNC_BODY_RETRY_DELAY: Duration = Duration::from_millis(200);
const RESYNC_BODY_RETRY_ATTEMPTS: u32 = 10;

/// Delay before restarting the subscription after a channel error.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// What became of one delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Claimed, enriched, committed.
    Processed,
    /// Dedupe said another worker owns it or already finished it.
    Duplicate,
    /// Processing failed; claim released for retry.
    Failed,
}

pub struct EventConsumer {
    store: Arc<dyn SnapshotStore>,
    catalog: Arc<dyn Catalog>,
    dedupe: Arc<dyn DedupeStore>,
    config: Config,
    workers: Arc<Semaphore>,
}

impl EventConsumer {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        catalog: Arc<dyn Catalog>,
        dedupe: Arc<dyn DedupeStore>,
        config: Config,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.worker_concurrency));
        Self {
            store,
            catalog,
            dedupe,
            config,
            workers,
        }
    }

    /// Bootstrap catalog state straight from the latest snapshot, bypassing
    /// the event channel. Every record in the window counts as "needs
    /// enrichment"; per-record failures are logged and skipped, never
    /// fatal.
    pub async fn resync(&self) -> Result<usize> {
        let version = self.store.latest_version().await?;
        if version == 0 {
            info!("No snapshot yet; skipping resync");
            return Ok(0);
        }

        let records = self.load_with_retry(version).await?;
        info!(version, records = records.len(), "Resyncing from latest snapshot");

        let mut synced = 0usize;
        for record in &records {
            let row = TokenUpsert::from(record);
            match timeout(self.config.enrich_timeout(), self.catalog.upsert(&row)).await {
                Ok(Ok(())) => synced += 1,
                Ok(Err(e)) => {
                    warn!(contract = %record.contract, error = %e, "Resync upsert failed; skipping")
                }
                Err(_) => {
                    warn!(contract = %record.contract, "Resync upsert timed out; skipping")
                }
            }
        }

        info!(version, synced, "Resync complete");
        Ok(synced)
    }

    /// A version number can be visible before its body write lands; retry
    /// briefly instead of treating an empty body as authoritative.
    async fn load_with_retry(&self, version: u64) -> Result<Vec<event_schema::RankedRecord>> {
        let mut attempts = 0u32;
        loop {
            let records = self.store.load(version).await?;
            if !records.is_empty() || attempts >= RESYNC_BODY_RETRY_ATTEMPTS {
                return Ok(records);
            }
            attempts += 1;
            debug!(version, attempts, "Window body not yet available; retrying");
            sleep(RESYNC_BODY_RETRY_DELAY).await;
        }
    }

    /// Subscribe and dispatch forever. Channel failures trigger a delayed
    /// resubscribe; they never kill the process.
    pub async fn run(self: Arc<Self>, client: redis::Client) {
        info!(channel = %self.config.channel, "Starting event consumer loop");

        loop {
            match self.clone().consume_stream(&client).await {
                Ok(()) => {
                    warn!("Event subscription ended unexpectedly; resubscribing");
                }
                Err(e) => {
                    error!(error = %e, "Event subscription failed; resubscribing after delay");
                }
            }
            sleep(RESUBSCRIBE_DELAY).await;
        }
    }

    async fn consume_stream(self: Arc<Self>, client: &redis::Client) -> Result<()> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&self.config.channel).await?;
        info!(channel = %self.config.channel, "Subscribed to change events");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "Failed to read message payload");
                    continue;
                }
            };

            let event: ChangeEvent = match serde_json::from_str(&payload) {
                Ok(ev) => ev,
                Err(e) => {
                    warn!(error = %e, payload = %payload, "Dropping malformed change event");
                    continue;
                }
            };

            // Bounded fan-out: per-event work is slow I/O, per-key changes
            // are independent, and the catalog is last-write-wins, so
            // concurrent workers stay consistent.
            let permit = match self.workers.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let consumer = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                consumer.handle_event(event).await;
            });
        }

        Ok(())
    }

    /// Process one delivery end to end. Never returns an error: failures
    /// are logged and the claim released so redelivery can retry.
    pub async fn handle_event(&self, event: ChangeEvent) -> EventOutcome {
        match self.dedupe.try_claim(&event.event_id).await {
            Ok(ClaimOutcome::Claimed) => {}
            Ok(ClaimOutcome::InFlight) | Ok(ClaimOutcome::Done) => {
                debug!(event_id = %event.event_id, "Skipping duplicate event");
                return EventOutcome::Duplicate;
            }
            Err(e) => {
                // Dedupe is best-effort; skip rather than double down on a
                // struggling Redis. The next resync covers the gap.
                warn!(event_id = %event.event_id, error = %e, "Dedupe claim failed; skipping event");
                return EventOutcome::Failed;
            }
        }

        let work = self.apply(&event);
        let result = match timeout(self.config.enrich_timeout(), work).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.config.enrich_timeout())),
        };

        match result {
            Ok(()) => {
                if let Err(e) = self.dedupe.mark_done(&event.event_id).await {
                    warn!(event_id = %event.event_id, error = %e, "Failed to commit dedupe record");
                }
                debug!(
                    event_id = %event.event_id,
                    change_type = %event.change_type,
                    "Event processed"
                );
                EventOutcome::Processed
            }
            Err(e) => {
                warn!(
                    event_id = %event.event_id,
                    change_type = %event.change_type,
                    error = %e,
                    "Event processing failed; releasing claim for retry"
                );
                if let Err(e) = self.dedupe.release(&event.event_id).await {
                    warn!(event_id = %event.event_id, error = %e, "Failed to release claim");
                }
                EventOutcome::Failed
            }
        }
    }

    /// Apply one change to the catalog.
    ///
    /// ADDED and MOVED pull the full record from the event's window for its
    /// attributes, falling back to a minimal row from the event fields if
    /// the body is unavailable. REMOVED clears the window membership while
    /// keeping attributes.
    async fn apply(&self, event: &ChangeEvent) -> Result<()> {
        let key = event.key();

        match event.change_type {
            ChangeType::Removed => self.catalog.mark_removed(&key).await,
            ChangeType::Added | ChangeType::Moved => {
                let window = self.store.load(event.window_version).await?;
                let row = window
                    .iter()
                    .find(|r| r.key() == key)
                    .map(TokenUpsert::from)
                    .unwrap_or_else(|| TokenUpsert::minimal(&key, event.new_rank));
                self.catalog.upsert(&row).await
            }
        }
    }
}
