//! Service module - the facade wiring every component together.

mod feed_sync_service;

#[cfg(test)]
mod feed_sync_service_tests;

pub use feed_sync_service::{FeedSyncDeps, FeedSyncService};
