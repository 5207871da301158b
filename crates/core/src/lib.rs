//! Feedsync Core - client-side live collection synchronization.
//!
//! This crate keeps partitioned feeds consistent with a push-based backend:
//! subscriptions per partition, merged and ordered snapshots, optimistic
//! writes with rollback, a debounced derived metric and batched author
//! enrichment. It is backend-agnostic and defines traits that are
//! implemented by the `storage-memory` crate.

pub mod config;
pub mod constants;
pub mod enrichment;
pub mod errors;
pub mod events;
pub mod feed;
pub mod ingestion;
pub mod metrics;
pub mod service;
pub mod subscriptions;
pub mod writes;

pub use config::SyncConfig;
pub use feed::{AuthorProfile, ChangeBatch, Delivery, Entry, FeedSnapshot, Provenance};
pub use service::{FeedSyncDeps, FeedSyncService};

// Re-export error types
pub use errors::Error;
pub use errors::Result;
