//! Change event publication.
//!
//! Fire-and-forget: the publisher neither persists events nor waits for
//! subscriber acknowledgment. A missed event is recoverable only through
//! the consumer's full resync against the latest snapshot.

use crate::error::Result;
use async_trait::async_trait;
use event_schema::ChangeEvent;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

#[async_trait]
pub trait ChangePublisher: Send + Sync {
    async fn publish(&self, event: &ChangeEvent) -> Result<()>;
}

/// Publishes events as JSON on a Redis pub/sub channel.
#[derive(Clone)]
pub struct RedisChangePublisher {
    conn: ConnectionManager,
    channel: String,
}

impl RedisChangePublisher {
    pub fn new(conn: ConnectionManager, channel: String) -> Self {
        Self { conn, channel }
    }
}

#[async_trait]
impl ChangePublisher for RedisChangePublisher {
    async fn publish(&self, event: &ChangeEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;

        let mut conn = self.conn.clone();
        let subscribers: usize = conn.publish(&self.channel, payload).await?;

        debug!(
            event_id = %event.event_id,
            change_type = %event.change_type,
            subscribers,
            channel = %self.channel,
            "Published change event"
        );
        Ok(())
    }
}

/// Collects published events in memory, for tests and local development.
#[derive(Default)]
pub struct MemoryChangePublisher {
    events: std::sync::Mutex<Vec<ChangeEvent>>,
}

impl MemoryChangePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ChangePublisher for MemoryChangePublisher {
    async fn publish(&self, event: &ChangeEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}
