//! Store contract tests, run against the in-memory implementation.
//!
//! The Redis implementation shares the same trait contract; Redis-dependent
//! paths are covered by the key-layout unit tests plus these semantics.

use chrono::Utc;
use event_schema::RankedRecord;
use snapshot_store::{MemorySnapshotStore, SnapshotStore};

fn record(contract: &str, rank: u32) -> RankedRecord {
    RankedRecord {
        chain: "sol".to_string(),
        contract: contract.to_string(),
        rank,
        name: Some(format!("Token {}", contract)),
        symbol: None,
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

#[tokio::test]
async fn test_fresh_store_reports_version_zero() {
    let store = MemorySnapshotStore::new();
    assert_eq!(store.latest_version().await.unwrap(), 0);
    assert!(store.load(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_versions_are_monotonic_from_one() {
    let store = MemorySnapshotStore::new();
    for expected in 1..=5u64 {
        let window = vec![record("aaa", 1), record("bbb", 2)];
        let version = store.save(&window, Utc::now()).await.unwrap();
        assert_eq!(version, expected);
        assert_eq!(store.latest_version().await.unwrap(), expected);
    }
}

#[tokio::test]
async fn test_load_returns_exactly_what_was_saved() {
    let store = MemorySnapshotStore::new();

    let first = vec![record("aaa", 1)];
    let second = vec![record("bbb", 1), record("ccc", 2)];
    let v1 = store.save(&first, Utc::now()).await.unwrap();
    let v2 = store.save(&second, Utc::now()).await.unwrap();

    let loaded1 = store.load(v1).await.unwrap();
    assert_eq!(loaded1.len(), 1);
    assert_eq!(loaded1[0].contract, "aaa");

    let loaded2 = store.load(v2).await.unwrap();
    assert_eq!(loaded2.len(), 2);
    assert_eq!(loaded2[0].contract, "bbb");
    assert_eq!(loaded2[1].rank, 2);
}

#[tokio::test]
async fn test_unknown_version_loads_empty_not_error() {
    let store = MemorySnapshotStore::new();
    store.save(&[record("aaa", 1)], Utc::now()).await.unwrap();
    assert!(store.load(99).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_saves_never_reuse_a_version() {
    let store = std::sync::Arc::new(MemorySnapshotStore::new());

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .save(&[record(&format!("t{}", i), 1)], Utc::now())
                .await
                .unwrap()
        }));
    }

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap());
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=10).collect::<Vec<u64>>());
}
