use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::AuthorProfile;

/// Cache record for one foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentTarget {
    pub key: String,
    pub resolved_at: DateTime<Utc>,
    /// `None` when the backend has no document for the key
    pub value: Option<AuthorProfile>,
}

/// Outcome of one enrichment cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentReport {
    /// Distinct keys referenced by the current snapshots
    pub keys_referenced: usize,
    /// Keys sent to the backend this cycle
    pub keys_requested: usize,
    pub requests_sent: usize,
    pub profiles_resolved: usize,
    pub failed_batches: usize,
    /// Snapshot entries whose denormalized value changed
    pub entries_updated: usize,
}
