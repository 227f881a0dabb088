//! Catalog enrichment consumer.
//!
//! Subscribes to the change-event channel, deduplicates deliveries, and
//! idempotently upserts token attributes into the catalog. On startup it
//! resynchronizes from the latest snapshot directly, which is what makes
//! the fire-and-forget channel tolerable: anything missed is picked up on
//! the next resync.

pub mod catalog;
pub mod config;
pub mod consumer;
pub mod error;
