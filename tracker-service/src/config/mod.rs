use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Redis (snapshot store + event channel)
    pub redis_url: String,

    // List provider
    pub trending_url: String,
    pub chain: String,
    pub provider_timeout_seconds: u64,

    // Window tracking
    pub window_size: usize,
    pub poll_interval_seconds: u64,
    pub poll_jitter_seconds: u64,

    // Rank delta at or above which a surviving token counts as MOVED.
    // The default is far beyond any realistic delta, which disables MOVED
    // detection until operators opt in.
    pub rank_move_threshold: u32,

    // Notification channel
    pub channel: String,

    // Observability
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .set_default("redis_url", "redis://127.0.0.1:6379/0")?
            .set_default("trending_url", "http://127.0.0.1:8080/trending.json")?
            .set_default("chain", "sol")?
            .set_default("provider_timeout_seconds", 30)?
            .set_default("window_size", 100)?
            .set_default("poll_interval_seconds", 60)?
            .set_default("poll_jitter_seconds", 5)?
            .set_default("rank_move_threshold", 999_999)?
            .set_default("channel", "token_changed")?
            .set_default("log_level", "info")?
            .add_source(config::Environment::default())
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(anyhow!("WINDOW_SIZE must be greater than 0"));
        }
        if self.poll_interval_seconds == 0 {
            return Err(anyhow!("POLL_INTERVAL_SECONDS must be greater than 0"));
        }
        if self.rank_move_threshold == 0 {
            return Err(anyhow!("RANK_MOVE_THRESHOLD must be at least 1"));
        }
        if self.channel.is_empty() {
            return Err(anyhow!("CHANNEL must not be empty"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
    }
}
