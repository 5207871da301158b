use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc;

use feedsync_core::feed::{
    Delivery, Entry, FeedSourceTrait, ListenerRegistration, WriteGatewayTrait,
};
use feedsync_core::Result;

use crate::store::MemoryStore;

/// Handle removing one listener from the store.
pub struct MemoryListenerRegistration {
    store: Weak<MemoryStore>,
    partition: String,
    listener_id: u64,
    removed: AtomicBool,
}

impl ListenerRegistration for MemoryListenerRegistration {
    fn remove(&self) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(store) = self.store.upgrade() {
            store.remove_listener(&self.partition, self.listener_id);
            debug!(
                "Removed listener {} on '{}'",
                self.listener_id, self.partition
            );
        }
    }
}

pub struct MemoryFeedRepository {
    store: Arc<MemoryStore>,
}

impl MemoryFeedRepository {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        MemoryFeedRepository { store }
    }
}

#[async_trait]
impl FeedSourceTrait for MemoryFeedRepository {
    async fn subscribe(
        &self,
        partition: &str,
        deliveries: mpsc::UnboundedSender<Delivery>,
    ) -> Result<Box<dyn ListenerRegistration>> {
        let listener_id = self.store.add_listener(partition, deliveries)?;
        Ok(Box::new(MemoryListenerRegistration {
            store: Arc::downgrade(&self.store),
            partition: partition.to_string(),
            listener_id,
            removed: AtomicBool::new(false),
        }))
    }
}

pub struct MemoryWriteGateway {
    store: Arc<MemoryStore>,
}

impl MemoryWriteGateway {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        MemoryWriteGateway { store }
    }
}

#[async_trait]
impl WriteGatewayTrait for MemoryWriteGateway {
    async fn write(&self, entry: &Entry) -> Result<()> {
        self.store.write(entry)?;
        Ok(())
    }
}
