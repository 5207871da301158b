use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

use super::writes_model::{PendingWrite, WriteState};
use super::writes_traits::OptimisticWriteServiceTrait;
use crate::errors::{Error, Result};
use crate::events::{FeedEvent, FeedEventSink};
use crate::feed::{Entry, Provenance, WriteGatewayTrait};
use crate::ingestion::IngestionPipeline;

/// Applies local writes immediately and reconciles them with the server.
///
/// Pending entries live in the pipeline's partition state, so submits,
/// confirmations and rollbacks share the same critical section as batch
/// merges.
pub struct OptimisticWriteManager {
    pipeline: Arc<IngestionPipeline>,
    gateway: Arc<dyn WriteGatewayTrait>,
    event_sink: Arc<dyn FeedEventSink>,
}

impl OptimisticWriteManager {
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        gateway: Arc<dyn WriteGatewayTrait>,
        event_sink: Arc<dyn FeedEventSink>,
    ) -> Self {
        Self {
            pipeline,
            gateway,
            event_sink,
        }
    }

    fn validate(entry: &Entry) -> Result<()> {
        if entry.id.trim().is_empty() {
            return Err(Error::InvalidEntry("entry id must not be empty".to_string()));
        }
        if entry.partition.trim().is_empty() {
            return Err(Error::InvalidEntry(format!(
                "entry '{}' has no partition",
                entry.id
            )));
        }
        Ok(())
    }

    /// Removes the pending slot and tells upstream to undo its change.
    fn roll_back_slot(
        &self,
        partition: &str,
        correlation_id: &str,
        reason: &str,
    ) -> Option<PendingWrite> {
        let (mut write, entry) = self.pipeline.remove_pending(partition, correlation_id)?;
        write.state = WriteState::Failed;

        info!(
            "Rolled back write {} for '{}' in '{}': {}",
            correlation_id, write.entry_id, partition, reason
        );
        self.event_sink.emit(FeedEvent::write_rolled_back(
            correlation_id,
            entry.with_provenance(Provenance::Rejected),
            reason,
        ));
        Some(write)
    }
}

#[async_trait]
impl OptimisticWriteServiceTrait for OptimisticWriteManager {
    async fn submit_write(&self, entry: Entry) -> Result<PendingWrite> {
        Self::validate(&entry)?;

        let entry = entry.with_provenance(Provenance::Pending);
        let mut write = PendingWrite::for_entry(&entry);
        debug!(
            "Submitting write {} for '{}' in '{}'",
            write.correlation_id, entry.id, entry.partition
        );
        self.pipeline.insert_pending(entry.clone(), write.clone());

        match self.gateway.write(&entry).await {
            Ok(()) => {
                if !self
                    .pipeline
                    .mark_write_confirmed(&write.partition, &write.correlation_id)
                {
                    debug!(
                        "Write {} acknowledged after its entry was already superseded",
                        write.correlation_id
                    );
                }
                write.state = WriteState::Confirmed;
                Ok(write)
            }
            Err(err) => {
                let reason = err.to_string();
                warn!("Write for '{}' rejected: {}", entry.id, reason);
                self.roll_back_slot(&write.partition, &write.correlation_id, &reason);
                Err(Error::write_rejected(&entry.id, reason))
            }
        }
    }

    fn rollback(&self, partition: &str, correlation_id: &str) -> Option<PendingWrite> {
        let rolled_back = self.roll_back_slot(partition, correlation_id, "rolled back by caller");
        if rolled_back.is_none() {
            debug!(
                "Rollback of {} in '{}' ignored: write is no longer pending",
                correlation_id, partition
            );
        }
        rolled_back
    }

    fn pending_writes(&self, partition: &str) -> Vec<PendingWrite> {
        self.pipeline.pending_writes(partition)
    }
}
