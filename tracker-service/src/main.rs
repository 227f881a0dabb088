use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::Client;
use snapshot_store::RedisSnapshotStore;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracker_service::config::Config;
use tracker_service::poller::Poller;
use tracker_service::provider::HttpTrendingProvider;
use tracker_service::publisher::RedisChangePublisher;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tracker_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tracker-service");

    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    info!("Configuration loaded and validated");

    let client = Client::open(config.redis_url.as_str())
        .context("Failed to construct Redis client")?;
    let conn = ConnectionManager::new(client)
        .await
        .context("Failed to initialize Redis connection manager")?;
    info!("Connected to Redis");

    let provider = Arc::new(
        HttpTrendingProvider::new(
            config.trending_url.clone(),
            config.chain.clone(),
            config.window_size,
            config.provider_timeout(),
        )
        .context("Failed to build trending provider")?,
    );
    let store = Arc::new(RedisSnapshotStore::new(conn.clone()));
    let publisher = Arc::new(RedisChangePublisher::new(conn, config.channel.clone()));

    let poller = Poller::new(provider, store, publisher, config);

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    poller.run(shutdown_rx).await;
    info!("tracker-service stopped");
    Ok(())
}
