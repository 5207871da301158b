use std::sync::Arc;

use async_trait::async_trait;

use feedsync_core::feed::{AuthorProfile, ProfileReaderTrait};
use feedsync_core::Result;

use crate::store::MemoryStore;

pub struct MemoryProfileRepository {
    store: Arc<MemoryStore>,
}

impl MemoryProfileRepository {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        MemoryProfileRepository { store }
    }
}

#[async_trait]
impl ProfileReaderTrait for MemoryProfileRepository {
    async fn read_profiles(&self, keys: &[String]) -> Result<Vec<AuthorProfile>> {
        Ok(self.store.read_profiles(keys)?)
    }
}
