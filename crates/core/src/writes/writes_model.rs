//! Optimistic write models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feed::Entry;

/// Lifecycle of an optimistic write.
///
/// `Confirmed` means the write primitive acknowledged the write; the entry
/// stays visible as pending until the push subscription delivers the
/// confirmed version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteState {
    Pending,
    Confirmed,
    Failed,
}

/// Bookkeeping for one optimistic write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWrite {
    pub correlation_id: String,
    /// Identity of the entry the write targets
    pub entry_id: String,
    pub partition: String,
    pub submitted_at: DateTime<Utc>,
    pub state: WriteState,
}

impl PendingWrite {
    /// Starts tracking a write for `entry` under a fresh correlation id.
    pub fn for_entry(entry: &Entry) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            entry_id: entry.id.clone(),
            partition: entry.partition.clone(),
            submitted_at: Utc::now(),
            state: WriteState::Pending,
        }
    }
}
