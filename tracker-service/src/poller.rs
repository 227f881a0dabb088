//! The poll loop: one fetch → save → diff → publish cycle per interval.
//!
//! Strictly sequential; a cycle completes or fails before the next one
//! starts. Any error aborts only the current cycle: the loop logs it,
//! counts it, and waits for the next tick. Snapshot writes and event
//! publishes are not transactionally coupled: a crash between them leaves a
//! stored window with no events, which the next cycle's diff and the
//! consumer's startup resync both cover.

use crate::config::Config;
use crate::diff::{diff_windows, WindowDiff};
use crate::error::Result;
use crate::provider::TrendingProvider;
use crate::publisher::ChangePublisher;
use chrono::Utc;
use event_schema::ChangeEvent;
use rand::Rng;
use snapshot_store::SnapshotStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Tick outcome counters, shared with whoever wants to observe loop health.
#[derive(Debug, Default)]
pub struct PollerStats {
    pub ticks_ok: AtomicU64,
    pub ticks_failed: AtomicU64,
}

impl PollerStats {
    pub fn record_success(&self) {
        self.ticks_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.ticks_failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Summary of one successful cycle.
#[derive(Debug)]
pub struct TickReport {
    pub window_version: u64,
    pub window_len: usize,
    pub added: usize,
    pub removed: usize,
    pub moved: usize,
    pub publish_failures: usize,
}

pub struct Poller {
    provider: Arc<dyn TrendingProvider>,
    store: Arc<dyn SnapshotStore>,
    publisher: Arc<dyn ChangePublisher>,
    config: Config,
    stats: Arc<PollerStats>,
}

impl Poller {
    pub fn new(
        provider: Arc<dyn TrendingProvider>,
        store: Arc<dyn SnapshotStore>,
        publisher: Arc<dyn ChangePublisher>,
        config: Config,
    ) -> Self {
        Self {
            provider,
            store,
            publisher,
            config,
            stats: Arc::new(PollerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PollerStats> {
        self.stats.clone()
    }

    /// Run until `shutdown` fires. Per-tick failures never terminate the
    /// loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<()>) {
        info!(
            interval_secs = self.config.poll_interval_seconds,
            window_size = self.config.window_size,
            move_threshold = self.config.rank_move_threshold,
            channel = %self.config.channel,
            "Starting trending poll loop"
        );

        loop {
            let tick_start = Instant::now();

            match self.run_once().await {
                Ok(report) => {
                    self.stats.record_success();
                    info!(
                        version = report.window_version,
                        window = report.window_len,
                        added = report.added,
                        removed = report.removed,
                        moved = report.moved,
                        publish_failures = report.publish_failures,
                        duration_ms = tick_start.elapsed().as_millis() as u64,
                        "Poll cycle completed"
                    );
                }
                Err(e) => {
                    self.stats.record_failure();
                    error!(
                        error = %e,
                        duration_ms = tick_start.elapsed().as_millis() as u64,
                        "Poll cycle failed; will retry next tick"
                    );
                }
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Poll loop shutting down");
                    break;
                }
                _ = sleep(self.tick_delay()) => {}
            }
        }
    }

    /// One complete cycle: pull, save as the next version, diff against the
    /// previous version, publish one event per change.
    pub async fn run_once(&self) -> Result<TickReport> {
        let as_of = Utc::now();

        let curr = self.provider.pull().await?;
        let new_version = self.store.save(&curr, as_of).await?;
        let prev = self.store.load(new_version.saturating_sub(1)).await?;

        let diff = diff_windows(&prev, &curr, self.config.rank_move_threshold);
        let publish_failures = self.publish_diff(&diff, new_version, as_of).await;

        Ok(TickReport {
            window_version: new_version,
            window_len: curr.len(),
            added: diff.added.len(),
            removed: diff.removed.len(),
            moved: diff.moved.len(),
            publish_failures,
        })
    }

    /// Publish every change in the diff. Publish failures are counted and
    /// logged but never abort the cycle: the channel is best-effort.
    async fn publish_diff(&self, diff: &WindowDiff, version: u64, as_of: chrono::DateTime<Utc>) -> usize {
        let mut failures = 0usize;

        let events = diff
            .added
            .iter()
            .map(|(key, new_rank)| ChangeEvent::added(key, *new_rank, version, as_of))
            .chain(
                diff.removed
                    .iter()
                    .map(|(key, old_rank)| ChangeEvent::removed(key, *old_rank, version, as_of)),
            )
            .chain(diff.moved.iter().map(|(key, old_rank, new_rank)| {
                ChangeEvent::moved(key, *old_rank, *new_rank, version, as_of)
            }));

        for event in events {
            if let Err(e) = self.publisher.publish(&event).await {
                failures += 1;
                warn!(event_id = %event.event_id, error = %e, "Dropping unpublished change event");
            }
        }

        failures
    }

    /// Interval plus a small random jitter so multiple trackers do not hit
    /// the provider in lockstep.
    fn tick_delay(&self) -> Duration {
        let base = self.config.poll_interval();
        if self.config.poll_jitter_seconds == 0 {
            return base;
        }
        let jitter_ms = rand::thread_rng()
            .gen_range(0..=self.config.poll_jitter_seconds.saturating_mul(1000));
        base + Duration::from_millis(jitter_ms)
    }
}
