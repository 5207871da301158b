use std::sync::Arc;

use async_trait::async_trait;

use feedsync_core::feed::CountSourceTrait;
use feedsync_core::Result;

use crate::store::MemoryStore;

pub struct MemoryCountRepository {
    store: Arc<MemoryStore>,
}

impl MemoryCountRepository {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        MemoryCountRepository { store }
    }
}

#[async_trait]
impl CountSourceTrait for MemoryCountRepository {
    async fn count(&self, source: &str) -> Result<u64> {
        Ok(self.store.count(source)?)
    }
}
