//! Event schema for the trending window pipeline.
//!
//! Defines the shared data model between the tracker (producer) and the
//! enrichment service (consumer): ranked window records, change events with
//! deterministic ids, and the metric-string parser used when ingesting raw
//! provider rows.
//!
//! Event ids are derived from the event's identifying fields rather than
//! generated, so two independently computed diffs over the same pair of
//! windows produce byte-identical ids. The consumer's dedupe layer depends
//! on this.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod metrics;

pub use metrics::parse_metric;

/// Identity of a tracked token: chain plus contract address.
///
/// Contract addresses are normalized to lowercase at construction so the
/// same token observed twice always hashes to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenKey {
    pub chain: String,
    pub contract: String,
}

impl TokenKey {
    pub fn new(chain: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            contract: contract.into().to_lowercase(),
        }
    }
}

impl std::fmt::Display for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.chain, self.contract)
    }
}

/// One row of a trending window.
///
/// `rank` is 1-based and unique within a window; a full window carries a
/// contiguous permutation of 1..N. Parsed metrics are `None` when the raw
/// source string could not be parsed; an unparsable field never rejects
/// the whole record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedRecord {
    pub chain: String,
    pub contract: String,
    pub rank: u32,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub market_cap_raw: String,
    pub liquidity_raw: String,
    pub volume_raw: String,
    pub market_cap: Option<f64>,
    pub liquidity: Option<f64>,
    pub volume: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

impl RankedRecord {
    pub fn key(&self) -> TokenKey {
        TokenKey::new(self.chain.clone(), self.contract.clone())
    }
}

/// Classification of a per-token change between two consecutive windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Added,
    Removed,
    Moved,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Added => write!(f, "ADDED"),
            ChangeType::Removed => write!(f, "REMOVED"),
            ChangeType::Moved => write!(f, "MOVED"),
        }
    }
}

/// Placeholder used in event ids for an absent rank (ADDED has no old rank,
/// REMOVED no new rank). Part of the id format; changing it invalidates
/// dedupe records produced by older builds.
const NO_RANK: &str = "-";

/// One notification describing a single per-token change, tied to the
/// window version that produced it.
///
/// Built only through [`ChangeEvent::new`] so `event_id` cannot drift from
/// the fields it is derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event_id: String,
    pub as_of: DateTime<Utc>,
    pub change_type: ChangeType,
    pub chain: String,
    pub contract: String,
    pub old_rank: Option<u32>,
    pub new_rank: Option<u32>,
    pub window_version: u64,
}

impl ChangeEvent {
    pub fn new(
        change_type: ChangeType,
        key: &TokenKey,
        old_rank: Option<u32>,
        new_rank: Option<u32>,
        window_version: u64,
        as_of: DateTime<Utc>,
    ) -> Self {
        let event_id = derive_event_id(key, window_version, change_type, old_rank, new_rank);
        Self {
            event_id,
            as_of,
            change_type,
            chain: key.chain.clone(),
            contract: key.contract.clone(),
            old_rank,
            new_rank,
            window_version,
        }
    }

    pub fn added(key: &TokenKey, new_rank: u32, window_version: u64, as_of: DateTime<Utc>) -> Self {
        Self::new(ChangeType::Added, key, None, Some(new_rank), window_version, as_of)
    }

    pub fn removed(key: &TokenKey, old_rank: u32, window_version: u64, as_of: DateTime<Utc>) -> Self {
        Self::new(ChangeType::Removed, key, Some(old_rank), None, window_version, as_of)
    }

    pub fn moved(
        key: &TokenKey,
        old_rank: u32,
        new_rank: u32,
        window_version: u64,
        as_of: DateTime<Utc>,
    ) -> Self {
        Self::new(
            ChangeType::Moved,
            key,
            Some(old_rank),
            Some(new_rank),
            window_version,
            as_of,
        )
    }

    pub fn key(&self) -> TokenKey {
        TokenKey::new(self.chain.clone(), self.contract.clone())
    }
}

fn derive_event_id(
    key: &TokenKey,
    window_version: u64,
    change_type: ChangeType,
    old_rank: Option<u32>,
    new_rank: Option<u32>,
) -> String {
    let old = old_rank.map_or_else(|| NO_RANK.to_string(), |r| r.to_string());
    let new = new_rank.map_or_else(|| NO_RANK.to_string(), |r| r.to_string());
    format!(
        "{}:{}:{}:{}:{}:{}",
        key.chain, key.contract, window_version, change_type, old, new
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TokenKey {
        TokenKey::new("sol", "So11111111111111111111111111111111111111112")
    }

    #[test]
    fn test_token_key_normalizes_contract() {
        let k = TokenKey::new("sol", "ABCdef123");
        assert_eq!(k.contract, "abcdef123");
        assert_eq!(k, TokenKey::new("sol", "abcDEF123"));
    }

    #[test]
    fn test_event_id_is_deterministic() {
        let as_of = Utc::now();
        let a = ChangeEvent::moved(&key(), 5, 2, 42, as_of);
        let b = ChangeEvent::moved(&key(), 5, 2, 42, as_of);
        assert_eq!(a.event_id, b.event_id);
    }

    #[test]
    fn test_event_id_encodes_absent_ranks() {
        let as_of = Utc::now();
        let added = ChangeEvent::added(&key(), 3, 7, as_of);
        assert!(added.event_id.ends_with(":7:ADDED:-:3"));
        assert_eq!(added.old_rank, None);

        let removed = ChangeEvent::removed(&key(), 9, 7, as_of);
        assert!(removed.event_id.ends_with(":7:REMOVED:9:-"));
        assert_eq!(removed.new_rank, None);
    }

    #[test]
    fn test_event_ids_differ_across_versions_and_types() {
        let as_of = Utc::now();
        let v1 = ChangeEvent::added(&key(), 3, 1, as_of);
        let v2 = ChangeEvent::added(&key(), 3, 2, as_of);
        assert_ne!(v1.event_id, v2.event_id);

        let moved = ChangeEvent::moved(&key(), 3, 3, 1, as_of);
        assert_ne!(v1.event_id, moved.event_id);
    }

    #[test]
    fn test_change_type_serialization() {
        assert_eq!(serde_json::to_string(&ChangeType::Added).unwrap(), "\"ADDED\"");
        assert_eq!(serde_json::to_string(&ChangeType::Removed).unwrap(), "\"REMOVED\"");
        assert_eq!(serde_json::to_string(&ChangeType::Moved).unwrap(), "\"MOVED\"");
        let back: ChangeType = serde_json::from_str("\"MOVED\"").unwrap();
        assert_eq!(back, ChangeType::Moved);
    }

    #[test]
    fn test_change_event_round_trip() {
        let ev = ChangeEvent::moved(&key(), 10, 1, 3, Utc::now());
        let json = serde_json::to_string(&ev).unwrap();
        let back: ChangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_id, ev.event_id);
        assert_eq!(back.change_type, ChangeType::Moved);
        assert_eq!(back.old_rank, Some(10));
        assert_eq!(back.new_rank, Some(1));
        assert_eq!(back.window_version, 3);
    }
}
