//! The token catalog: external store of enriched per-token attributes.
//!
//! Upserts are keyed by contract and last-write-wins on attributes, so
//! reprocessing any event (replay, dedupe expiry, consumer restart)
//! converges to the same row instead of corrupting it. Safe for concurrent
//! callers on distinct keys.

use crate::error::Result;
use async_trait::async_trait;
use event_schema::{RankedRecord, TokenKey};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// One catalog row's worth of attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenUpsert {
    pub chain: String,
    pub contract: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub market_cap: Option<f64>,
    pub liquidity: Option<f64>,
    pub volume: Option<f64>,
    pub thumbnail: Option<String>,
    /// Current rank in the trending window, `None` once out of the window.
    pub rank: Option<u32>,
}

impl From<&RankedRecord> for TokenUpsert {
    fn from(rec: &RankedRecord) -> Self {
        Self {
            chain: rec.chain.clone(),
            contract: rec.contract.clone(),
            name: rec.name.clone(),
            symbol: rec.symbol.clone(),
            market_cap: rec.market_cap,
            liquidity: rec.liquidity,
            volume: rec.volume,
            thumbnail: rec.thumbnail.clone(),
            rank: Some(rec.rank),
        }
    }
}

impl TokenUpsert {
    /// Minimal row built from event fields alone, used when the window body
    /// backing an event is not available.
    pub fn minimal(key: &TokenKey, rank: Option<u32>) -> Self {
        Self {
            chain: key.chain.clone(),
            contract: key.contract.clone(),
            name: None,
            symbol: None,
            market_cap: None,
            liquidity: None,
            volume: None,
            thumbnail: None,
            rank,
        }
    }
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Insert or update the row for `row.contract`, last-write-wins.
    async fn upsert(&self, row: &TokenUpsert) -> Result<()>;

    /// Mark a token as no longer in the trending window, keeping its
    /// attributes. A no-op for tokens the catalog has never seen.
    async fn mark_removed(&self, key: &TokenKey) -> Result<()>;
}

/// Postgres-backed catalog.
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tokens table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                contract    VARCHAR(64) PRIMARY KEY,
                chain       VARCHAR(16) NOT NULL,
                name        TEXT,
                symbol      TEXT,
                market_cap  DOUBLE PRECISION,
                liquidity   DOUBLE PRECISION,
                volume      DOUBLE PRECISION,
                thumbnail   TEXT,
                rank        INTEGER,
                in_window   BOOLEAN NOT NULL DEFAULT TRUE,
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn upsert(&self, row: &TokenUpsert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens
                (contract, chain, name, symbol, market_cap, liquidity, volume,
                 thumbnail, rank, in_window, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, NOW())
            ON CONFLICT (contract) DO UPDATE SET
                chain      = EXCLUDED.chain,
                name       = COALESCE(EXCLUDED.name, tokens.name),
                symbol     = COALESCE(EXCLUDED.symbol, tokens.symbol),
                market_cap = EXCLUDED.market_cap,
                liquidity  = EXCLUDED.liquidity,
                volume     = EXCLUDED.volume,
                thumbnail  = COALESCE(EXCLUDED.thumbnail, tokens.thumbnail),
                rank       = EXCLUDED.rank,
                in_window  = TRUE,
                updated_at = NOW()
            "#,
        )
        .bind(&row.contract)
        .bind(&row.chain)
        .bind(&row.name)
        .bind(&row.symbol)
        .bind(row.market_cap)
        .bind(row.liquidity)
        .bind(row.volume)
        .bind(&row.thumbnail)
        .bind(row.rank.map(|r| r as i32))
        .execute(&self.pool)
        .await?;

        debug!(contract = %row.contract, rank = ?row.rank, "Upserted catalog row");
        Ok(())
    }

    async fn mark_removed(&self, key: &TokenKey) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tokens
            SET rank = NULL, in_window = FALSE, updated_at = NOW()
            WHERE contract = $1
            "#,
        )
        .bind(&key.contract)
        .execute(&self.pool)
        .await?;

        debug!(contract = %key.contract, "Marked token out of window");
        Ok(())
    }
}

/// A catalog row as held by [`MemoryCatalog`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRow {
    pub row: TokenUpsert,
    pub in_window: bool,
}

/// In-memory catalog for tests and local development. Same last-write-wins
/// semantics as the Postgres implementation.
#[derive(Default)]
pub struct MemoryCatalog {
    rows: Mutex<HashMap<String, MemoryRow>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, contract: &str) -> Option<MemoryRow> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(contract)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn upsert(&self, row: &TokenUpsert) -> Result<()> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        match rows.get_mut(&row.contract) {
            Some(existing) => {
                // COALESCE semantics on display fields, like the SQL path.
                let mut merged = row.clone();
                if merged.name.is_none() {
                    merged.name = existing.row.name.clone();
                }
                if merged.symbol.is_none() {
                    merged.symbol = existing.row.symbol.clone();
                }
                if merged.thumbnail.is_none() {
                    merged.thumbnail = existing.row.thumbnail.clone();
                }
                *existing = MemoryRow {
                    row: merged,
                    in_window: true,
                };
            }
            None => {
                rows.insert(
                    row.contract.clone(),
                    MemoryRow {
                        row: row.clone(),
                        in_window: true,
                    },
                );
            }
        }
        Ok(())
    }

    async fn mark_removed(&self, key: &TokenKey) -> Result<()> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = rows.get_mut(&key.contract) {
            existing.in_window = false;
            existing.row.rank = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_upsert_is_last_write_wins() {
        let catalog = MemoryCatalog::new();
        let key = TokenKey::new("sol", "abc");

        let mut first = TokenUpsert::minimal(&key, Some(5));
        first.name = Some("Old Name".into());
        first.market_cap = Some(100.0);
        catalog.upsert(&first).await.unwrap();

        let mut second = TokenUpsert::minimal(&key, Some(2));
        second.market_cap = Some(200.0);
        catalog.upsert(&second).await.unwrap();

        let row = catalog.get("abc").unwrap();
        assert_eq!(row.row.rank, Some(2));
        assert_eq!(row.row.market_cap, Some(200.0));
        // Absent display fields keep the prior value.
        assert_eq!(row.row.name.as_deref(), Some("Old Name"));
    }

    #[tokio::test]
    async fn test_mark_removed_keeps_attributes() {
        let catalog = MemoryCatalog::new();
        let key = TokenKey::new("sol", "abc");

        let mut row = TokenUpsert::minimal(&key, Some(1));
        row.symbol = Some("TOK".into());
        catalog.upsert(&row).await.unwrap();
        catalog.mark_removed(&key).await.unwrap();

        let stored = catalog.get("abc").unwrap();
        assert!(!stored.in_window);
        assert_eq!(stored.row.rank, None);
        assert_eq!(stored.row.symbol.as_deref(), Some("TOK"));
    }

    #[tokio::test]
    async fn test_mark_removed_unknown_token_is_noop() {
        let catalog = MemoryCatalog::new();
        catalog
            .mark_removed(&TokenKey::new("sol", "ghost"))
            .await
            .unwrap();
        assert!(catalog.is_empty());
    }
}
