//! Shared document store behind every in-memory repository.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use log::{debug, warn};
use tokio::sync::mpsc;

use feedsync_core::feed::{AuthorProfile, ChangeBatch, Delivery, Entry, Provenance};

use crate::errors::StorageError;

/// Maximum number of keys accepted by one point-read request.
pub const DEFAULT_MAX_READ_BATCH: usize = 10;

struct Listener {
    id: u64,
    deliveries: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct StoreState {
    documents: HashMap<String, BTreeMap<String, Entry>>,
    listeners: HashMap<String, Vec<Listener>>,
    next_listener_id: u64,
    profiles: HashMap<String, AuthorProfile>,
    counts: HashMap<String, u64>,
    failing_counts: HashSet<String>,
    denied_writes: HashSet<String>,
    offline: bool,
    profile_requests: Vec<Vec<String>>,
    subscribe_calls: usize,
}

impl StoreState {
    /// Sends `batch` to every listener of `partition`, dropping listeners
    /// whose receiver is gone.
    fn fan_out(&mut self, partition: &str, batch: &ChangeBatch) {
        let Some(listeners) = self.listeners.get_mut(partition) else {
            return;
        };
        listeners.retain(|listener| {
            listener
                .deliveries
                .send(Delivery::Batch(batch.clone()))
                .is_ok()
        });
    }
}

/// Process-local document store with fault injection.
pub struct MemoryStore {
    state: Mutex<StoreState>,
    max_read_batch: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_max_read_batch(DEFAULT_MAX_READ_BATCH)
    }

    pub fn with_max_read_batch(max_read_batch: usize) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            max_read_batch,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Memory store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn max_read_batch(&self) -> usize {
        self.max_read_batch
    }

    // --- Documents ---

    /// Stores `entries` as confirmed documents and pushes them to listeners.
    pub fn upsert(&self, partition: &str, entries: Vec<Entry>) {
        let entries: Vec<Entry> = entries
            .into_iter()
            .map(|mut entry| {
                entry.partition = partition.to_string();
                entry.provenance = Provenance::Confirmed;
                entry.author = None;
                entry
            })
            .collect();

        let mut state = self.lock_state();
        let documents = state.documents.entry(partition.to_string()).or_default();
        for entry in &entries {
            documents.insert(entry.id.clone(), entry.clone());
        }
        state.fan_out(partition, &ChangeBatch::upserts(entries));
    }

    /// Deletes documents and pushes the removals to listeners.
    pub fn remove(&self, partition: &str, ids: Vec<String>) {
        let mut state = self.lock_state();
        if let Some(documents) = state.documents.get_mut(partition) {
            for id in &ids {
                documents.remove(id);
            }
        }
        state.fan_out(partition, &ChangeBatch::removals(ids));
    }

    pub fn documents(&self, partition: &str) -> Vec<Entry> {
        self.lock_state()
            .documents
            .get(partition)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn put_profile(&self, profile: AuthorProfile) {
        self.lock_state()
            .profiles
            .insert(profile.id.clone(), profile);
    }

    pub fn set_count(&self, source: &str, value: u64) {
        self.lock_state().counts.insert(source.to_string(), value);
    }

    // --- Fault injection ---

    /// Terminates every stream on `partition` with a failure. Returns the
    /// number of listeners notified.
    pub fn fail_stream(&self, partition: &str, message: &str) -> usize {
        let listeners = self
            .lock_state()
            .listeners
            .remove(partition)
            .unwrap_or_default();
        for listener in &listeners {
            let _ = listener
                .deliveries
                .send(Delivery::Failed(message.to_string()));
        }
        debug!(
            "Failed {} stream(s) on '{}': {}",
            listeners.len(),
            partition,
            message
        );
        listeners.len()
    }

    /// While offline, subscribe calls are refused.
    pub fn set_offline(&self, offline: bool) {
        self.lock_state().offline = offline;
    }

    /// Makes every write of document `id` fail.
    pub fn deny_writes(&self, id: &str) {
        self.lock_state().denied_writes.insert(id.to_string());
    }

    pub fn fail_count(&self, source: &str) {
        self.lock_state().failing_counts.insert(source.to_string());
    }

    pub fn restore_count(&self, source: &str) {
        self.lock_state().failing_counts.remove(source);
    }

    // --- Call records ---

    pub fn subscribe_calls(&self) -> usize {
        self.lock_state().subscribe_calls
    }

    pub fn listener_count(&self, partition: &str) -> usize {
        self.lock_state()
            .listeners
            .get(partition)
            .map_or(0, Vec::len)
    }

    /// Keys of every point-read request, in arrival order.
    pub fn profile_requests(&self) -> Vec<Vec<String>> {
        self.lock_state().profile_requests.clone()
    }

    // --- Primitive operations used by the repositories ---

    /// Registers a listener and delivers the current documents as the
    /// initial batch.
    pub(crate) fn add_listener(
        &self,
        partition: &str,
        deliveries: mpsc::UnboundedSender<Delivery>,
    ) -> Result<u64, StorageError> {
        let mut state = self.lock_state();
        state.subscribe_calls += 1;
        if state.offline {
            return Err(StorageError::Offline);
        }

        let initial: Vec<Entry> = state
            .documents
            .get(partition)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default();
        if !initial.is_empty() {
            let _ = deliveries.send(Delivery::Batch(ChangeBatch::upserts(initial)));
        }

        state.next_listener_id += 1;
        let id = state.next_listener_id;
        state
            .listeners
            .entry(partition.to_string())
            .or_default()
            .push(Listener { id, deliveries });
        Ok(id)
    }

    pub(crate) fn remove_listener(&self, partition: &str, id: u64) {
        let mut state = self.lock_state();
        if let Some(listeners) = state.listeners.get_mut(partition) {
            listeners.retain(|listener| listener.id != id);
        }
    }

    pub(crate) fn read_profiles(&self, keys: &[String]) -> Result<Vec<AuthorProfile>, StorageError> {
        if keys.len() > self.max_read_batch {
            return Err(StorageError::ReadBatchTooLarge {
                requested: keys.len(),
                limit: self.max_read_batch,
            });
        }
        let mut state = self.lock_state();
        state.profile_requests.push(keys.to_vec());
        Ok(keys
            .iter()
            .filter_map(|key| state.profiles.get(key).cloned())
            .collect())
    }

    pub(crate) fn write(&self, entry: &Entry) -> Result<(), StorageError> {
        if self.lock_state().denied_writes.contains(&entry.id) {
            return Err(StorageError::WriteDenied(entry.id.clone()));
        }
        self.upsert(&entry.partition, vec![entry.clone()]);
        Ok(())
    }

    pub(crate) fn count(&self, source: &str) -> Result<u64, StorageError> {
        let state = self.lock_state();
        if state.failing_counts.contains(source) {
            return Err(StorageError::CountFailed(source.to_string()));
        }
        Ok(state.counts.get(source).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn entry(id: &str) -> Entry {
        Entry::new(id, "prayer", Utc::now(), json!({})).with_author_id("ana")
    }

    #[test]
    fn test_new_listener_receives_current_documents() {
        let store = MemoryStore::new();
        store.upsert("prayer", vec![entry("a"), entry("b")]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        store.add_listener("prayer", tx).unwrap();

        match rx.try_recv().unwrap() {
            Delivery::Batch(batch) => assert_eq!(batch.upserts.len(), 2),
            other => panic!("unexpected delivery {other:?}"),
        }
        assert_eq!(store.listener_count("prayer"), 1);
    }

    #[test]
    fn test_removed_listener_stops_receiving() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = store.add_listener("prayer", tx).unwrap();

        store.remove_listener("prayer", id);
        store.upsert("prayer", vec![entry("a")]);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_offline_store_refuses_subscriptions() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let (tx, _rx) = mpsc::unbounded_channel();

        assert_eq!(store.add_listener("prayer", tx), Err(StorageError::Offline));
        assert_eq!(store.subscribe_calls(), 1);
    }

    #[test]
    fn test_read_batch_limit_is_enforced() {
        let store = MemoryStore::with_max_read_batch(2);
        let keys: Vec<String> = ["a", "b", "c"].iter().map(|k| k.to_string()).collect();

        assert_eq!(
            store.read_profiles(&keys),
            Err(StorageError::ReadBatchTooLarge {
                requested: 3,
                limit: 2
            })
        );
        assert!(store.profile_requests().is_empty());
    }

    #[test]
    fn test_denied_write_is_not_stored() {
        let store = MemoryStore::new();
        store.deny_writes("x");

        assert!(store.write(&entry("x")).is_err());
        assert!(store.write(&entry("y")).is_ok());
        let ids: Vec<String> = store.documents("prayer").into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["y".to_string()]);
    }

    #[test]
    fn test_stored_documents_drop_denormalized_author() {
        let store = MemoryStore::new();
        let mut authored = entry("a");
        authored.author = Some(AuthorProfile {
            id: "ana".to_string(),
            display_name: "Ana".to_string(),
            photo_url: None,
        });

        store.upsert("prayer", vec![authored.with_provenance(Provenance::Pending)]);

        let stored = &store.documents("prayer")[0];
        assert!(stored.author.is_none());
        assert_eq!(stored.provenance, Provenance::Confirmed);
    }
}
