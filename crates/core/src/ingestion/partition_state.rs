//! Mutable state of a single partition.
//!
//! Everything here runs inside the partition's critical section. The
//! confirmed set and the pending-write set live side by side so that a
//! confirmation and a submit can never interleave.

use std::collections::HashMap;

use log::debug;

use crate::feed::{causal_order, AuthorProfile, ChangeBatch, Entry, Provenance};
use crate::writes::PendingWrite;

/// A pending optimistic entry and its write record.
#[derive(Debug, Clone)]
pub(crate) struct PendingSlot {
    pub write: PendingWrite,
    pub entry: Entry,
}

#[derive(Debug, Default)]
pub(crate) struct PartitionState {
    /// Epoch of the subscription feeding this partition, if any.
    pub epoch: Option<u64>,
    /// Latest confirmed version of every entry, keyed by identity.
    pub confirmed: HashMap<String, Entry>,
    /// At most one pending slot per identity.
    pub pending: HashMap<String, PendingSlot>,
    /// Version of the last published snapshot.
    pub version: u64,
}

impl PartitionState {
    /// Merges a batch into the confirmed set.
    ///
    /// Later versions of an identity replace earlier ones, including
    /// duplicates within the batch itself. A confirmed entry supersedes any
    /// pending slot with the same identity.
    pub fn apply_batch(&mut self, batch: ChangeBatch) {
        for mut entry in batch.upserts {
            entry.provenance = Provenance::Confirmed;

            if entry.author.is_none() {
                if let Some(previous) = self.confirmed.get(&entry.id) {
                    if previous.author_id == entry.author_id {
                        entry.author = previous.author.clone();
                    }
                }
            }

            if let Some(slot) = self.pending.remove(&entry.id) {
                debug!(
                    "Confirmed entry '{}' superseded pending write {}",
                    entry.id, slot.write.correlation_id
                );
            }

            self.confirmed.insert(entry.id.clone(), entry);
        }

        for id in batch.removed_ids {
            self.confirmed.remove(&id);
        }
    }

    /// Inserts or replaces the pending slot for the entry's identity.
    pub fn insert_pending(&mut self, entry: Entry, write: PendingWrite) -> Option<PendingSlot> {
        self.pending
            .insert(entry.id.clone(), PendingSlot { write, entry })
    }

    /// Removes the pending slot for `entry_id` when it still belongs to
    /// `correlation_id`.
    pub fn take_pending(&mut self, entry_id: &str, correlation_id: &str) -> Option<PendingSlot> {
        match self.pending.get(entry_id) {
            Some(slot) if slot.write.correlation_id == correlation_id => {
                self.pending.remove(entry_id)
            }
            _ => None,
        }
    }

    pub fn find_pending(&self, correlation_id: &str) -> Option<&PendingSlot> {
        self.pending
            .values()
            .find(|slot| slot.write.correlation_id == correlation_id)
    }

    /// Writes resolved author profiles onto every entry referencing them.
    /// Returns the number of entries whose denormalized value changed.
    pub fn apply_profiles(&mut self, profiles: &HashMap<String, AuthorProfile>) -> usize {
        let confirmed = self.confirmed.values_mut();
        let pending = self.pending.values_mut().map(|slot| &mut slot.entry);

        let mut updated = 0;
        for entry in confirmed.chain(pending) {
            let Some(profile) = entry.author_id.as_ref().and_then(|key| profiles.get(key)) else {
                continue;
            };
            if entry.author.as_ref() != Some(profile) {
                entry.author = Some(profile.clone());
                updated += 1;
            }
        }
        updated
    }

    /// Drops all entries and pending writes.
    pub fn clear(&mut self) {
        self.epoch = None;
        self.confirmed.clear();
        self.pending.clear();
    }

    /// Builds the deduplicated, causally ordered entry list.
    ///
    /// Pending entries only appear while no confirmed entry shares their
    /// identity, so an identity is never listed twice.
    pub fn merged_entries(&self) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self.confirmed.values().cloned().collect();
        entries.extend(
            self.pending
                .values()
                .filter(|slot| !self.confirmed.contains_key(&slot.entry.id))
                .map(|slot| slot.entry.clone()),
        );
        entries.sort_by(causal_order);
        entries
    }
}
