//! Registry of active push subscriptions.
//!
//! Each partition has at most one slot. A slot is reserved with a single
//! check-and-set under the registry lock before the backend is contacted, so
//! two near-simultaneous `start_listening` calls can never both subscribe.
//! Every activation gets a fresh epoch; the pipeline only merges batches
//! carrying the current epoch, which discards deliveries that race a stop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::{Error, Result};
use crate::events::{FeedEvent, FeedEventSink};
use crate::feed::{ChangeBatch, Delivery, FeedSourceTrait, ListenerRegistration};
use crate::ingestion::IngestionPipeline;

/// Public view of a registry slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub partition: String,
    pub epoch: u64,
    /// False while the backend subscribe call is still in progress
    pub active: bool,
}

enum SlotState {
    /// Reserved; waiting for the backend to return a registration.
    Starting,
    Active {
        registration: Box<dyn ListenerRegistration>,
        delivery_task: JoinHandle<()>,
    },
}

struct Slot {
    epoch: u64,
    state: SlotState,
}

impl Slot {
    fn cancel(self, partition: &str) {
        if let SlotState::Active {
            registration,
            delivery_task,
        } = self.state
        {
            registration.remove();
            delivery_task.abort();
        }
        debug!("Cancelled subscription to '{}' (epoch {})", partition, self.epoch);
    }
}

struct RegistryInner {
    source: Arc<dyn FeedSourceTrait>,
    pipeline: Arc<IngestionPipeline>,
    event_sink: Arc<dyn FeedEventSink>,
    offload_batch_threshold: usize,
    slots: Mutex<HashMap<String, Slot>>,
    last_epoch: AtomicU64,
}

impl RegistryInner {
    /// Lock the slots mutex, recovering from poison if necessary.
    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| {
            warn!("Subscription registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Removes the slot for `partition` only if it still belongs to `epoch`.
    fn take_slot_if_current(&self, partition: &str, epoch: u64) -> Option<Slot> {
        let mut slots = self.lock_slots();
        let is_current = slots.get(partition).is_some_and(|slot| slot.epoch == epoch);
        if is_current {
            slots.remove(partition)
        } else {
            None
        }
    }

    /// Merges a batch off the delivery path. Large batches go to the
    /// blocking pool so they do not stall the runtime worker.
    async fn ingest(&self, partition: &str, epoch: u64, batch: ChangeBatch) {
        if batch.upserts.len() < self.offload_batch_threshold {
            self.pipeline.apply_batch(partition, epoch, batch);
            return;
        }

        let pipeline = self.pipeline.clone();
        let owned_partition = partition.to_string();
        let merged = tokio::task::spawn_blocking(move || {
            pipeline.apply_batch(&owned_partition, epoch, batch)
        })
        .await;
        if let Err(err) = merged {
            warn!("Merge task for '{}' failed: {}", partition, err);
        }
    }

    /// Marks the partition inactive after a transport failure and surfaces
    /// the error. The last published snapshot is kept.
    fn fail(&self, partition: &str, epoch: u64, message: String) {
        let Some(slot) = self.take_slot_if_current(partition, epoch) else {
            debug!(
                "Ignoring failure of stale subscription to '{}' (epoch {})",
                partition, epoch
            );
            return;
        };

        self.pipeline.detach_partition(partition, epoch);
        if let SlotState::Active { registration, .. } = slot.state {
            registration.remove();
        }

        let error = Error::subscription(partition, message.as_str());
        warn!("{}", error);
        self.event_sink
            .emit(FeedEvent::subscription_failed(partition, message));
    }
}

/// Owns the delivery loop of one subscription.
async fn run_delivery(
    inner: Arc<RegistryInner>,
    partition: String,
    epoch: u64,
    mut deliveries: mpsc::UnboundedReceiver<Delivery>,
) {
    while let Some(delivery) = deliveries.recv().await {
        match delivery {
            Delivery::Batch(batch) => inner.ingest(&partition, epoch, batch).await,
            Delivery::Failed(message) => {
                inner.fail(&partition, epoch, message);
                return;
            }
        }
    }
    inner.fail(&partition, epoch, "stream closed by backend".to_string());
}

/// Tracks one push subscription per partition.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new(
        source: Arc<dyn FeedSourceTrait>,
        pipeline: Arc<IngestionPipeline>,
        event_sink: Arc<dyn FeedEventSink>,
        offload_batch_threshold: usize,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                source,
                pipeline,
                event_sink,
                offload_batch_threshold,
                slots: Mutex::new(HashMap::new()),
                last_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Starts listening to `partition`.
    ///
    /// Returns `Ok(false)` without contacting the backend when the partition
    /// already has a slot, and also when the partition was stopped while the
    /// backend subscribe call was in flight.
    pub async fn start_listening(&self, partition: &str) -> Result<bool> {
        let epoch = {
            let mut slots = self.inner.lock_slots();
            if slots.contains_key(partition) {
                debug!("Already listening to '{}'", partition);
                return Ok(false);
            }
            let epoch = self.inner.last_epoch.fetch_add(1, Ordering::SeqCst) + 1;
            slots.insert(
                partition.to_string(),
                Slot {
                    epoch,
                    state: SlotState::Starting,
                },
            );
            self.inner.pipeline.open_partition(partition, epoch);
            epoch
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let registration = match self.inner.source.subscribe(partition, tx).await {
            Ok(registration) => registration,
            Err(err) => {
                if self.inner.take_slot_if_current(partition, epoch).is_some() {
                    self.inner.pipeline.detach_partition(partition, epoch);
                }
                warn!("Failed to subscribe to '{}': {}", partition, err);
                return Err(Error::subscription(partition, err.to_string()));
            }
        };

        let delivery_task = tokio::spawn(run_delivery(
            self.inner.clone(),
            partition.to_string(),
            epoch,
            rx,
        ));

        let orphaned = {
            let mut slots = self.inner.lock_slots();
            match slots.get_mut(partition) {
                Some(slot) if slot.epoch == epoch => {
                    slot.state = SlotState::Active {
                        registration,
                        delivery_task,
                    };
                    None
                }
                _ => Some((registration, delivery_task)),
            }
        };

        match orphaned {
            None => {
                info!("Listening to '{}' (epoch {})", partition, epoch);
                Ok(true)
            }
            Some((registration, delivery_task)) => {
                debug!(
                    "Subscription to '{}' was stopped while starting; cancelling",
                    partition
                );
                registration.remove();
                delivery_task.abort();
                Ok(false)
            }
        }
    }

    /// Stops listening to `partition` and clears its snapshot.
    /// Returns false when the partition was not active.
    pub fn stop_listening(&self, partition: &str) -> bool {
        let slot = {
            let mut slots = self.inner.lock_slots();
            let slot = slots.remove(partition);
            if slot.is_some() {
                self.inner.pipeline.close_partition(partition);
            }
            slot
        };

        match slot {
            Some(slot) => {
                slot.cancel(partition);
                info!("Stopped listening to '{}'", partition);
                true
            }
            None => false,
        }
    }

    /// Cancels every subscription. Returns how many were cancelled.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<(String, Slot)> = {
            let mut slots = self.inner.lock_slots();
            let drained: Vec<(String, Slot)> = slots.drain().collect();
            for (partition, _) in &drained {
                self.inner.pipeline.close_partition(partition);
            }
            drained
        };

        let count = drained.len();
        for (partition, slot) in drained {
            slot.cancel(&partition);
        }
        if count > 0 {
            info!("Stopped {} subscription(s)", count);
        }
        count
    }

    /// True while `partition` holds a slot (starting or active).
    pub fn is_active(&self, partition: &str) -> bool {
        self.inner.lock_slots().contains_key(partition)
    }

    /// Partitions holding a slot, sorted by name.
    pub fn active_partitions(&self) -> Vec<String> {
        let mut partitions: Vec<String> = self.inner.lock_slots().keys().cloned().collect();
        partitions.sort();
        partitions
    }

    /// Current subscriptions, sorted by partition.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let mut subscriptions: Vec<Subscription> = self
            .inner
            .lock_slots()
            .iter()
            .map(|(partition, slot)| Subscription {
                partition: partition.clone(),
                epoch: slot.epoch,
                active: matches!(slot.state, SlotState::Active { .. }),
            })
            .collect();
        subscriptions.sort_by(|a, b| a.partition.cmp(&b.partition));
        subscriptions
    }
}
