//! Primitives consumed from the backing store.
//!
//! These traits hide the document store and its wire protocol. Any backend
//! that can push change batches, read documents by key, accept writes and
//! count documents can drive the engine.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::feed_model::{AuthorProfile, Delivery, Entry};
use crate::errors::Result;

/// Cancellation handle for an open push subscription.
pub trait ListenerRegistration: Send + Sync {
    /// Stops delivery. Must be idempotent.
    fn remove(&self);
}

/// Push-subscription primitive.
#[async_trait]
pub trait FeedSourceTrait: Send + Sync {
    /// Opens a subscription on `partition`.
    ///
    /// Deliveries are sent to `deliveries` until the returned registration is
    /// removed or a [`Delivery::Failed`] has been sent. Sending must never
    /// block the backend, hence the unbounded channel.
    async fn subscribe(
        &self,
        partition: &str,
        deliveries: mpsc::UnboundedSender<Delivery>,
    ) -> Result<Box<dyn ListenerRegistration>>;
}

/// Batched point-read primitive for author profiles.
#[async_trait]
pub trait ProfileReaderTrait: Send + Sync {
    /// Reads the profiles for `keys`. Unknown keys are omitted from the result.
    ///
    /// Callers never pass more than the backend's batch ceiling.
    async fn read_profiles(&self, keys: &[String]) -> Result<Vec<AuthorProfile>>;
}

/// Write primitive.
#[async_trait]
pub trait WriteGatewayTrait: Send + Sync {
    /// Persists `entry`. An error means the server rejected the write.
    async fn write(&self, entry: &Entry) -> Result<()>;
}

/// Count primitive backing the derived metric.
#[async_trait]
pub trait CountSourceTrait: Send + Sync {
    async fn count(&self, source: &str) -> Result<u64>;
}
