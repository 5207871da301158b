use async_trait::async_trait;

use super::writes_model::PendingWrite;
use crate::errors::Result;
use crate::feed::Entry;

/// Trait defining the contract for optimistic write operations.
#[async_trait]
pub trait OptimisticWriteServiceTrait: Send + Sync {
    /// Publishes `entry` as pending, then persists it.
    ///
    /// Returns the write record once the backend acknowledged it. On
    /// rejection the pending entry is rolled back and
    /// [`crate::Error::WriteRejected`] is returned.
    async fn submit_write(&self, entry: Entry) -> Result<PendingWrite>;

    /// Removes a pending write on the caller's behalf.
    ///
    /// Returns the failed write record, or `None` when the write is no
    /// longer pending.
    fn rollback(&self, partition: &str, correlation_id: &str) -> Option<PendingWrite>;

    /// Outstanding writes of a partition.
    fn pending_writes(&self, partition: &str) -> Vec<PendingWrite>;
}
