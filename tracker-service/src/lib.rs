//! Trending window tracker.
//!
//! One sequential poll loop per process: pull the current ranked window from
//! the provider, persist it as the next snapshot version, diff it against
//! the previous version, and publish one change event per difference on the
//! notification channel.

pub mod config;
pub mod diff;
pub mod error;
pub mod poller;
pub mod provider;
pub mod publisher;
