//! In-memory backend for Feedsync.
//!
//! This crate implements the primitives defined in `feedsync-core` on top of
//! a process-local document store:
//! - Push subscriptions per partition, with an initial snapshot delivery
//! - Batched point reads of author profiles, bounded per request
//! - A write gateway that echoes accepted writes to subscribers
//! - Document counts for the derived metric
//!
//! Every primitive has fault-injection hooks so failure paths can be driven
//! from tests and from the simulator.
//!
//! ```text
//!          feedsync-core (engine)
//!                  │
//!                  ▼
//!   storage-memory (this crate)
//!                  │
//!                  ▼
//!            MemoryStore
//! ```

pub mod counts;
pub mod errors;
pub mod feeds;
pub mod profiles;
pub mod store;

pub use counts::MemoryCountRepository;
pub use errors::StorageError;
pub use feeds::{MemoryFeedRepository, MemoryWriteGateway};
pub use profiles::MemoryProfileRepository;
pub use store::{MemoryStore, DEFAULT_MAX_READ_BATCH};

use std::sync::Arc;

use feedsync_core::events::FeedEventSink;
use feedsync_core::FeedSyncDeps;

/// Builds engine dependencies where every primitive is served by `store`.
pub fn memory_deps(store: Arc<MemoryStore>, event_sink: Arc<dyn FeedEventSink>) -> FeedSyncDeps {
    FeedSyncDeps {
        source: Arc::new(MemoryFeedRepository::new(store.clone())),
        profiles: Arc::new(MemoryProfileRepository::new(store.clone())),
        writes: Arc::new(MemoryWriteGateway::new(store.clone())),
        counts: Arc::new(MemoryCountRepository::new(store)),
        event_sink,
    }
}
