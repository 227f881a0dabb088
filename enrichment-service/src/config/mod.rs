use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Redis (snapshot store, event channel, dedupe records)
    pub redis_url: String,

    // Postgres catalog. Required: no default, startup aborts without it.
    pub database_url: String,

    // Notification channel
    pub channel: String,

    // Dedupe records
    pub dedupe_ttl_seconds: u64,

    // Event fan-out
    pub worker_concurrency: usize,
    pub enrich_timeout_seconds: u64,

    // Observability
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .set_default("redis_url", "redis://127.0.0.1:6379/0")?
            .set_default("channel", "token_changed")?
            .set_default("dedupe_ttl_seconds", 600)?
            .set_default("worker_concurrency", 4)?
            .set_default("enrich_timeout_seconds", 30)?
            .set_default("log_level", "info")?
            .add_source(config::Environment::default())
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            return Err(anyhow!("DATABASE_URL is required"));
        }
        if self.channel.is_empty() {
            return Err(anyhow!("CHANNEL must not be empty"));
        }
        if self.dedupe_ttl_seconds == 0 {
            return Err(anyhow!("DEDUPE_TTL_SECONDS must be greater than 0"));
        }
        if self.worker_concurrency == 0 {
            return Err(anyhow!("WORKER_CONCURRENCY must be greater than 0"));
        }
        Ok(())
    }

    pub fn dedupe_ttl(&self) -> Duration {
        Duration::from_secs(self.dedupe_ttl_seconds)
    }

    pub fn enrich_timeout(&self) -> Duration {
        Duration::from_secs(self.enrich_timeout_seconds)
    }
}
