//! Ranked list providers.
//!
//! How the trending window is actually obtained (crawling, browser
//! automation, anti-bot handling) lives behind this trait. The bundled
//! implementation is a thin HTTP client for an endpoint that already serves
//! the window as JSON rows in rank order.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use event_schema::{parse_metric, RankedRecord};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of the current trending window, invoked once per poll cycle.
/// Errors are transient; the poll loop skips the cycle and retries next
/// tick.
#[async_trait]
pub trait TrendingProvider: Send + Sync {
    async fn pull(&self) -> Result<Vec<RankedRecord>>;
}

/// Raw provider row before ranking and metric parsing.
#[derive(Debug, Deserialize)]
struct RawTrendingRow {
    contract: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    market_cap: String,
    #[serde(default)]
    liquidity: String,
    #[serde(default)]
    volume: String,
    #[serde(default)]
    thumbnail: Option<String>,
}

/// HTTP JSON provider.
///
/// Expects a JSON array of rows already sorted by rank; assigns contiguous
/// ranks 1..N and truncates to the configured window size. Rows without a
/// contract address are skipped, and unparsable metric strings yield `None`
/// for the parsed value without rejecting the row.
pub struct HttpTrendingProvider {
    client: reqwest::Client,
    url: String,
    chain: String,
    window_size: usize,
}

impl HttpTrendingProvider {
    pub fn new(url: String, chain: String, window_size: usize, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Provider(e.to_string()))?;
        Ok(Self {
            client,
            url,
            chain,
            window_size,
        })
    }

    fn to_records(&self, rows: Vec<RawTrendingRow>) -> Vec<RankedRecord> {
        let mut records = Vec::with_capacity(self.window_size.min(rows.len()));
        let mut rank = 1u32;

        for row in rows {
            if records.len() >= self.window_size {
                break;
            }
            let contract = row.contract.trim().to_lowercase();
            if contract.is_empty() {
                warn!("Skipping trending row without contract address");
                continue;
            }

            let link = format!("https://dexscreener.com/{}/{}", self.chain, contract);
            records.push(RankedRecord {
                chain: self.chain.clone(),
                contract,
                rank,
                name: row.name,
                symbol: row.symbol,
                market_cap: parse_metric(&row.market_cap),
                liquidity: parse_metric(&row.liquidity),
                volume: parse_metric(&row.volume),
                market_cap_raw: row.market_cap,
                liquidity_raw: row.liquidity,
                volume_raw: row.volume,
                thumbnail: row.thumbnail,
                link: Some(link),
            });
            rank += 1;
        }

        records
    }
}

#[async_trait]
impl TrendingProvider for HttpTrendingProvider {
    async fn pull(&self) -> Result<Vec<RankedRecord>> {
        debug!(url = %self.url, "Fetching trending window");

        let response = self.client.get(&self.url).send().await?;
        let response = response
            .error_for_status()
            .map_err(|e| AppError::Provider(e.to_string()))?;
        let rows: Vec<RawTrendingRow> = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("invalid trending payload: {}", e)))?;

        let records = self.to_records(rows);
        debug!(records = records.len(), "Fetched trending window");
        Ok(records)
    }
}

/// Fixed-window provider for tests and local development.
pub struct StaticProvider {
    windows: std::sync::Mutex<std::collections::VecDeque<Vec<RankedRecord>>>,
}

impl StaticProvider {
    /// Serves each window once, in order; the last window repeats forever.
    pub fn new(windows: Vec<Vec<RankedRecord>>) -> Self {
        Self {
            windows: std::sync::Mutex::new(windows.into()),
        }
    }
}

#[async_trait]
impl TrendingProvider for StaticProvider {
    async fn pull(&self) -> Result<Vec<RankedRecord>> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        if windows.len() > 1 {
            Ok(windows.pop_front().unwrap_or_default())
        } else {
            windows
                .front()
                .cloned()
                .ok_or_else(|| AppError::Provider("no window configured".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> HttpTrendingProvider {
        HttpTrendingProvider::new(
            "http://127.0.0.1:8080/trending.json".to_string(),
            "sol".to_string(),
            3,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn row(contract: &str) -> RawTrendingRow {
        RawTrendingRow {
            contract: contract.to_string(),
            name: Some("Token".into()),
            symbol: Some("TOK".into()),
            market_cap: "$1.2M".into(),
            liquidity: "$300K".into(),
            volume: "bad".into(),
            thumbnail: None,
        }
    }

    #[test]
    fn test_ranks_are_contiguous_and_window_truncated() {
        let rows = vec![row("A1"), row("B2"), row("C3"), row("D4")];
        let records = provider().to_records(rows);

        assert_eq!(records.len(), 3);
        let ranks: Vec<u32> = records.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_contract_normalized_and_metrics_parsed() {
        let records = provider().to_records(vec![row("AbCd")]);
        let rec = &records[0];
        assert_eq!(rec.contract, "abcd");
        assert_eq!(rec.market_cap, Some(1_200_000.0));
        assert_eq!(rec.liquidity, Some(300_000.0));
        // Unparsable metric keeps the record, parsed value absent.
        assert_eq!(rec.volume, None);
        assert_eq!(rec.volume_raw, "bad");
    }

    #[test]
    fn test_rows_without_contract_are_skipped() {
        let mut bad = row("");
        bad.contract = "   ".into();
        let records = provider().to_records(vec![bad, row("ok")]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].contract, "ok");
        assert_eq!(records[0].rank, 1);
    }
}
