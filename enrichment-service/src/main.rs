use anyhow::{Context, Result};
use dedupe_guard::RedisDedupeStore;
use redis::aio::ConnectionManager;
use redis::Client;
use snapshot_store::RedisSnapshotStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use enrichment_service::catalog::PgCatalog;
use enrichment_service::config::Config;
use enrichment_service::consumer::EventConsumer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,enrichment_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting enrichment-service");

    // The only fatal startup condition: missing/invalid required config
    // (DATABASE_URL in particular).
    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    info!("Configuration loaded and validated");

    let pool = PgPoolOptions::new()
        .max_connections(config.worker_concurrency as u32 + 2)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to catalog database")?;
    let catalog = Arc::new(PgCatalog::new(pool));
    catalog
        .ensure_schema()
        .await
        .context("Failed to ensure catalog schema")?;
    info!("Catalog schema ready");

    let client = Client::open(config.redis_url.as_str())
        .context("Failed to construct Redis client")?;
    let conn = ConnectionManager::new(client.clone())
        .await
        .context("Failed to initialize Redis connection manager")?;
    info!("Connected to Redis");

    let store = Arc::new(RedisSnapshotStore::new(conn.clone()));
    let dedupe = Arc::new(RedisDedupeStore::new(conn, config.dedupe_ttl()));

    let consumer = Arc::new(EventConsumer::new(store, catalog, dedupe, config));

    // Resync first, then subscribe: anything published while we bootstrap
    // is missed by design and covered by the next resync. A failed resync
    // is degraded, not fatal; live events still flow and the catalog stays
    // idempotent.
    if let Err(e) = consumer.resync().await {
        tracing::warn!(error = %e, "Initial resync failed; continuing with live events only");
    }

    consumer.run(client).await;
    Ok(())
}
