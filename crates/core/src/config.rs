//! Tunables for the sync engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ENRICHMENT_BATCH_SIZE, DEFAULT_ENRICHMENT_INTERVAL, DEFAULT_METRIC_DEBOUNCE,
    DEFAULT_METRIC_SOURCES, DEFAULT_METRIC_TTL, DEFAULT_OFFLOAD_BATCH_THRESHOLD,
};

/// Configuration shared by every component of the engine.
///
/// Durations are stored in milliseconds so the struct deserializes from
/// flat JSON or environment-derived values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Time a computed metric is served from cache (default: 60s)
    pub metric_ttl_ms: u64,

    /// Coalescing window for metric update requests (default: 500ms)
    pub metric_debounce_ms: u64,

    /// The two sources whose counts are summed into the metric
    pub metric_sources: [String; 2],

    /// Interval between enrichment cycles (default: 5 minutes)
    pub enrichment_interval_ms: u64,

    /// Keys per point-read request (default: 10, the backend ceiling)
    pub enrichment_batch_size: usize,

    /// Batches of at least this many upserts are merged on the blocking pool
    pub offload_batch_threshold: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            metric_ttl_ms: DEFAULT_METRIC_TTL.as_millis() as u64,
            metric_debounce_ms: DEFAULT_METRIC_DEBOUNCE.as_millis() as u64,
            metric_sources: DEFAULT_METRIC_SOURCES.map(str::to_string),
            enrichment_interval_ms: DEFAULT_ENRICHMENT_INTERVAL.as_millis() as u64,
            enrichment_batch_size: DEFAULT_ENRICHMENT_BATCH_SIZE,
            offload_batch_threshold: DEFAULT_OFFLOAD_BATCH_THRESHOLD,
        }
    }
}

impl SyncConfig {
    pub fn metric_ttl(&self) -> Duration {
        Duration::from_millis(self.metric_ttl_ms)
    }

    pub fn metric_debounce(&self) -> Duration {
        Duration::from_millis(self.metric_debounce_ms)
    }

    pub fn enrichment_interval(&self) -> Duration {
        Duration::from_millis(self.enrichment_interval_ms)
    }

    /// Batch size clamped to at least one key per request.
    pub fn effective_batch_size(&self) -> usize {
        self.enrichment_batch_size.max(1)
    }
}
