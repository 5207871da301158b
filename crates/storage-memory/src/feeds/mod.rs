//! In-memory push subscriptions and write gateway.

mod repository;

pub use repository::{MemoryFeedRepository, MemoryListenerRegistration, MemoryWriteGateway};
