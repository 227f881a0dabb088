//! Consumer flow tests against the in-memory store, catalog, and dedupe
//! implementations: resync, claim/commit discipline, retry after failure,
//! and idempotent application.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dedupe_guard::{DedupeStore, MemoryDedupeStore};
use event_schema::{ChangeEvent, RankedRecord, TokenKey};
use snapshot_store::{MemorySnapshotStore, SnapshotStore};

use enrichment_service::catalog::{Catalog, MemoryCatalog, TokenUpsert};
use enrichment_service::config::Config;
use enrichment_service::consumer::{EventConsumer, EventOutcome};
use enrichment_service::error::{AppError, Result};

fn record(contract: &str, rank: u32) -> RankedRecord {
    RankedRecord {
        chain: "sol".to_string(),
        contract: contract.to_string(),
        rank,
        name: Some(format!("Token {}", contract)),
        symbol: Some("TOK".to_string()),
        market_cap_raw: "$1.2M".to_string(),
        liquidity_raw: "$300K".to_string(),
        volume_raw: "$88K".to_string(),
        market_cap: Some(1_200_000.0),
        liquidity: Some(300_000.0),
        volume: Some(88_000.0),
        thumbnail: None,
        link: None,
    }
}

fn test_config() -> Config {
    Config {
        redis_url: String::new(),
        database_url: "unused".into(),
        channel: "token_changed".into(),
        dedupe_ttl_seconds: 600,
        worker_concurrency: 4,
        enrich_timeout_seconds: 5,
        log_level: "info".into(),
    }
}

struct Fixture {
    store: Arc<MemorySnapshotStore>,
    catalog: Arc<MemoryCatalog>,
    dedupe: Arc<MemoryDedupeStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: Arc::new(MemorySnapshotStore::new()),
            catalog: Arc::new(MemoryCatalog::new()),
            dedupe: Arc::new(MemoryDedupeStore::new(Duration::from_secs(600))),
        }
    }

    fn consumer(&self) -> EventConsumer {
        EventConsumer::new(
            self.store.clone(),
            self.catalog.clone(),
            self.dedupe.clone(),
            test_config(),
        )
    }

    fn consumer_with_catalog(&self, catalog: Arc<dyn Catalog>) -> EventConsumer {
        EventConsumer::new(
            self.store.clone(),
            catalog,
            self.dedupe.clone(),
            test_config(),
        )
    }
}

/// Catalog that fails a configurable number of upserts before delegating.
struct FlakyCatalog {
    inner: Arc<MemoryCatalog>,
    failures_left: AtomicU32,
}

#[async_trait]
impl Catalog for FlakyCatalog {
    async fn upsert(&self, row: &TokenUpsert) -> Result<()> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AppError::Catalog("injected failure".to_string()));
        }
        self.inner.upsert(row).await
    }

    async fn mark_removed(&self, key: &TokenKey) -> Result<()> {
        self.inner.mark_removed(key).await
    }
}

#[tokio::test]
async fn test_resync_populates_catalog_from_latest_window() {
    let fx = Fixture::new();
    fx.store
        .save(&[record("aaa", 1), record("bbb", 2)], Utc::now())
        .await
        .unwrap();
    fx.store
        .save(&[record("bbb", 1), record("ccc", 2)], Utc::now())
        .await
        .unwrap();

    let synced = fx.consumer().resync().await.unwrap();

    // Only the latest window is resynced.
    assert_eq!(synced, 2);
    assert!(fx.catalog.get("bbb").is_some());
    assert!(fx.catalog.get("ccc").is_some());
    assert!(fx.catalog.get("aaa").is_none());
    assert_eq!(fx.catalog.get("bbb").unwrap().row.rank, Some(1));
}

#[tokio::test]
async fn test_resync_with_no_snapshot_is_a_noop() {
    let fx = Fixture::new();
    assert_eq!(fx.consumer().resync().await.unwrap(), 0);
    assert!(fx.catalog.is_empty());
}

#[tokio::test]
async fn test_added_event_enriches_from_window_body() {
    let fx = Fixture::new();
    let version = fx
        .store
        .save(&[record("aaa", 1)], Utc::now())
        .await
        .unwrap();
    let consumer = fx.consumer();

    let event = ChangeEvent::added(&TokenKey::new("sol", "aaa"), 1, version, Utc::now());
    assert_eq!(consumer.handle_event(event).await, EventOutcome::Processed);

    let row = fx.catalog.get("aaa").unwrap();
    assert_eq!(row.row.name.as_deref(), Some("Token aaa"));
    assert_eq!(row.row.market_cap, Some(1_200_000.0));
    assert_eq!(row.row.rank, Some(1));
}

#[tokio::test]
async fn test_added_event_without_window_body_falls_back_to_event_fields() {
    let fx = Fixture::new();
    let consumer = fx.consumer();

    // Version 9 has no body stored: the benign visibility window.
    let event = ChangeEvent::added(&TokenKey::new("sol", "aaa"), 3, 9, Utc::now());
    assert_eq!(consumer.handle_event(event).await, EventOutcome::Processed);

    let row = fx.catalog.get("aaa").unwrap();
    assert_eq!(row.row.rank, Some(3));
    assert_eq!(row.row.name, None);
}

#[tokio::test]
async fn test_removed_event_marks_token_out_of_window() {
    let fx = Fixture::new();
    let version = fx
        .store
        .save(&[record("aaa", 1)], Utc::now())
        .await
        .unwrap();
    let consumer = fx.consumer();

    let added = ChangeEvent::added(&TokenKey::new("sol", "aaa"), 1, version, Utc::now());
    consumer.handle_event(added).await;

    let removed = ChangeEvent::removed(&TokenKey::new("sol", "aaa"), 1, version + 1, Utc::now());
    assert_eq!(consumer.handle_event(removed).await, EventOutcome::Processed);

    let row = fx.catalog.get("aaa").unwrap();
    assert!(!row.in_window);
    assert_eq!(row.row.rank, None);
    // Attributes survive removal.
    assert_eq!(row.row.name.as_deref(), Some("Token aaa"));
}

#[tokio::test]
async fn test_duplicate_delivery_is_suppressed_by_dedupe() {
    let fx = Fixture::new();
    let version = fx
        .store
        .save(&[record("aaa", 1)], Utc::now())
        .await
        .unwrap();
    let consumer = fx.consumer();

    let event = ChangeEvent::added(&TokenKey::new("sol", "aaa"), 1, version, Utc::now());
    assert_eq!(
        consumer.handle_event(event.clone()).await,
        EventOutcome::Processed
    );
    assert_eq!(
        consumer.handle_event(event).await,
        EventOutcome::Duplicate
    );
}

#[tokio::test]
async fn test_reprocessing_is_idempotent_with_or_without_dedupe_record() {
    let fx = Fixture::new();
    let version = fx
        .store
        .save(&[record("aaa", 1)], Utc::now())
        .await
        .unwrap();
    let consumer = fx.consumer();

    let event = ChangeEvent::added(&TokenKey::new("sol", "aaa"), 1, version, Utc::now());
    consumer.handle_event(event.clone()).await;
    let after_once = fx.catalog.get("aaa").unwrap();

    // Simulate dedupe TTL expiry: drop the record and replay the event.
    fx.dedupe.release(&event.event_id).await.unwrap();
    assert_eq!(consumer.handle_event(event).await, EventOutcome::Processed);

    let after_twice = fx.catalog.get("aaa").unwrap();
    assert_eq!(after_once, after_twice);
}

#[tokio::test]
async fn test_failed_upsert_releases_claim_and_allows_retry() {
    let fx = Fixture::new();
    let version = fx
        .store
        .save(&[record("aaa", 1)], Utc::now())
        .await
        .unwrap();

    let flaky = Arc::new(FlakyCatalog {
        inner: fx.catalog.clone(),
        failures_left: AtomicU32::new(1),
    });
    let consumer = fx.consumer_with_catalog(flaky);

    let event = ChangeEvent::added(&TokenKey::new("sol", "aaa"), 1, version, Utc::now());

    // First delivery fails and releases its claim instead of committing.
    assert_eq!(
        consumer.handle_event(event.clone()).await,
        EventOutcome::Failed
    );
    assert!(fx.catalog.get("aaa").is_none());

    // Redelivery before TTL expiry succeeds.
    assert_eq!(consumer.handle_event(event).await, EventOutcome::Processed);
    assert!(fx.catalog.get("aaa").is_some());
}
