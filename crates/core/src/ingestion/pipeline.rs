//! Per-partition ingestion and snapshot publication.
//!
//! Every partition owns a mutex-guarded [`PartitionState`]. Batch merges,
//! pending-write changes and enrichment write-backs for the same partition
//! all run under that mutex, so they are serialized; different partitions
//! proceed independently. Each mutation ends with a publication: the merged
//! view is frozen into an `Arc<FeedSnapshot>`, swapped into a watch channel
//! and handed to the registered observers before the mutex is released,
//! which keeps observer delivery FIFO per partition.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use dashmap::DashMap;
use log::{debug, trace, warn};
use tokio::sync::watch;

use super::partition_state::{PartitionState, PendingSlot};
use crate::feed::{AuthorProfile, ChangeBatch, Entry, FeedSnapshot};
use crate::writes::{PendingWrite, WriteState};

/// Receives every snapshot published for a partition.
///
/// Called inside the partition's critical section: implementations must be
/// fast and must not call back into the pipeline or the subscription
/// registry.
pub trait SnapshotObserver: Send + Sync {
    fn on_snapshot(&self, snapshot: &Arc<FeedSnapshot>);
}

impl<F> SnapshotObserver for F
where
    F: Fn(&Arc<FeedSnapshot>) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &Arc<FeedSnapshot>) {
        self(snapshot)
    }
}

struct PartitionCell {
    name: String,
    state: Mutex<PartitionState>,
    publisher: watch::Sender<Arc<FeedSnapshot>>,
    observers: Mutex<Vec<Arc<dyn SnapshotObserver>>>,
}

impl PartitionCell {
    fn new(name: &str) -> Self {
        let (publisher, _) = watch::channel(Arc::new(FeedSnapshot::empty(name)));
        Self {
            name: name.to_string(),
            state: Mutex::new(PartitionState::default()),
            publisher,
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Lock the partition state, recovering from poison if necessary.
    ///
    /// A poisoned lock means a merge panicked half-way; the state maps are
    /// still structurally valid and the next publication rebuilds the view.
    fn lock_state(&self) -> MutexGuard<'_, PartitionState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Partition '{}' state mutex was poisoned, recovering", self.name);
            poisoned.into_inner()
        })
    }

    fn lock_observers(&self) -> MutexGuard<'_, Vec<Arc<dyn SnapshotObserver>>> {
        self.observers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publishes the current merged view. Must be called with the state lock held.
    fn publish(&self, state: &mut PartitionState) -> Arc<FeedSnapshot> {
        state.version += 1;
        let snapshot = Arc::new(FeedSnapshot {
            partition: self.name.clone(),
            version: state.version,
            published_at: Utc::now(),
            entries: state.merged_entries(),
        });

        self.publisher.send_replace(snapshot.clone());

        let observers = self.lock_observers().clone();
        for observer in observers {
            observer.on_snapshot(&snapshot);
        }

        trace!(
            "Published snapshot v{} of '{}' ({} entries)",
            snapshot.version,
            self.name,
            snapshot.len()
        );
        snapshot
    }
}

/// Merges change batches and optimistic writes into published snapshots.
#[derive(Default)]
pub struct IngestionPipeline {
    partitions: DashMap<String, Arc<PartitionCell>>,
}

impl IngestionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, partition: &str) -> Arc<PartitionCell> {
        if let Some(cell) = self.partitions.get(partition) {
            return cell.clone();
        }
        self.partitions
            .entry(partition.to_string())
            .or_insert_with(|| Arc::new(PartitionCell::new(partition)))
            .clone()
    }

    /// The cell of a partition that was already opened, watched or written to.
    fn existing(&self, partition: &str) -> Option<Arc<PartitionCell>> {
        self.partitions.get(partition).map(|cell| cell.clone())
    }

    /// Names of every partition opened, watched or written to.
    pub fn partitions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// The current snapshot of `partition` (empty if never published).
    pub fn snapshot(&self, partition: &str) -> Arc<FeedSnapshot> {
        match self.existing(partition) {
            Some(cell) => cell.publisher.borrow().clone(),
            None => Arc::new(FeedSnapshot::empty(partition)),
        }
    }

    /// A receiver that always holds the latest snapshot of `partition`.
    pub fn watch(&self, partition: &str) -> watch::Receiver<Arc<FeedSnapshot>> {
        self.cell(partition).publisher.subscribe()
    }

    /// Registers an observer for every future snapshot of `partition`.
    pub fn observe(&self, partition: &str, observer: Arc<dyn SnapshotObserver>) {
        self.cell(partition).lock_observers().push(observer);
    }

    /// Accepts batches tagged with `epoch` from now on.
    pub fn open_partition(&self, partition: &str, epoch: u64) {
        let cell = self.cell(partition);
        let mut state = cell.lock_state();
        debug!("Opening partition '{}' for epoch {}", partition, epoch);
        state.epoch = Some(epoch);
    }

    /// Stops accepting batches but keeps the last published view.
    ///
    /// Only detaches when `epoch` is still the current one, so a late failure
    /// from an old subscription cannot detach its successor.
    pub fn detach_partition(&self, partition: &str, epoch: u64) -> bool {
        let Some(cell) = self.existing(partition) else {
            return false;
        };
        let mut state = cell.lock_state();
        if state.epoch == Some(epoch) {
            state.epoch = None;
            true
        } else {
            false
        }
    }

    /// Stops accepting batches and clears every entry of the partition,
    /// pending writes included. Publishes an empty snapshot.
    pub fn close_partition(&self, partition: &str) {
        let Some(cell) = self.existing(partition) else {
            return;
        };
        let mut state = cell.lock_state();
        let dropped = state.confirmed.len() + state.pending.len();
        state.clear();
        cell.publish(&mut state);
        debug!("Closed partition '{}' ({} entries dropped)", partition, dropped);
    }

    /// Applies a batch delivered by the subscription of the given epoch.
    ///
    /// Returns false, without touching the partition, when the epoch is not
    /// the active one (the subscription was stopped or replaced).
    pub fn apply_batch(&self, partition: &str, epoch: u64, batch: ChangeBatch) -> bool {
        let Some(cell) = self.existing(partition) else {
            debug!(
                "Discarding batch of {} change(s) for unopened partition '{}'",
                batch.len(),
                partition
            );
            return false;
        };
        let mut state = cell.lock_state();

        if state.epoch != Some(epoch) {
            debug!(
                "Discarding batch of {} change(s) for '{}': epoch {} is not active",
                batch.len(),
                partition,
                epoch
            );
            return false;
        }

        let changes = batch.len();
        state.apply_batch(batch);
        let snapshot = cell.publish(&mut state);
        debug!(
            "Ingested {} change(s) into '{}' -> v{} ({} entries)",
            changes,
            partition,
            snapshot.version,
            snapshot.len()
        );
        true
    }

    /// Adds an optimistic entry and publishes immediately.
    pub fn insert_pending(&self, entry: Entry, write: PendingWrite) -> Arc<FeedSnapshot> {
        let cell = self.cell(&entry.partition);
        let mut state = cell.lock_state();
        if let Some(previous) = state.insert_pending(entry, write) {
            debug!(
                "Pending write {} replaced by a newer write for '{}'",
                previous.write.correlation_id, previous.entry.id
            );
        }
        cell.publish(&mut state)
    }

    /// Records that the write primitive acknowledged a pending write.
    pub fn mark_write_confirmed(&self, partition: &str, correlation_id: &str) -> bool {
        let Some(cell) = self.existing(partition) else {
            return false;
        };
        let mut state = cell.lock_state();
        let entry_id = match state.find_pending(correlation_id) {
            Some(slot) => slot.entry.id.clone(),
            None => return false,
        };
        if let Some(slot) = state.pending.get_mut(&entry_id) {
            slot.write.state = WriteState::Confirmed;
        }
        true
    }

    /// Removes a pending write and publishes the partition without it.
    ///
    /// Returns `None` when the write is no longer pending, either because a
    /// confirmed entry superseded it or because it was already removed.
    pub fn remove_pending(
        &self,
        partition: &str,
        correlation_id: &str,
    ) -> Option<(PendingWrite, Entry)> {
        let cell = self.existing(partition)?;
        let mut state = cell.lock_state();
        let entry_id = state.find_pending(correlation_id)?.entry.id.clone();
        let PendingSlot { write, entry } = state.take_pending(&entry_id, correlation_id)?;
        cell.publish(&mut state);
        Some((write, entry))
    }

    /// Outstanding writes of `partition`, oldest first.
    pub fn pending_writes(&self, partition: &str) -> Vec<PendingWrite> {
        let Some(cell) = self.existing(partition) else {
            return Vec::new();
        };
        let state = cell.lock_state();
        let mut writes: Vec<PendingWrite> =
            state.pending.values().map(|slot| slot.write.clone()).collect();
        writes.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        writes
    }

    /// Distinct author keys referenced by the current snapshots.
    pub fn author_ids(&self) -> BTreeSet<String> {
        let cells: Vec<Arc<PartitionCell>> =
            self.partitions.iter().map(|e| e.value().clone()).collect();
        cells
            .iter()
            .flat_map(|cell| {
                let snapshot = cell.publisher.borrow().clone();
                snapshot
                    .entries
                    .iter()
                    .filter_map(|e| e.author_id.clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Writes resolved profiles onto matching entries of every partition,
    /// re-publishing only partitions that changed. Returns the number of
    /// entries updated.
    pub fn apply_profiles(&self, profiles: &HashMap<String, AuthorProfile>) -> usize {
        if profiles.is_empty() {
            return 0;
        }

        let cells: Vec<Arc<PartitionCell>> =
            self.partitions.iter().map(|e| e.value().clone()).collect();

        let mut total = 0;
        for cell in cells {
            let mut state = cell.lock_state();
            let updated = state.apply_profiles(profiles);
            if updated > 0 {
                cell.publish(&mut state);
                total += updated;
            }
        }
        total
    }
}
