use std::time::Duration;

use feedsync_core::constants::{PRAYER_PARTITION, TESTIMONY_PARTITION};
use feedsync_core::SyncConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub partitions: Vec<String>,
    pub tick_interval: Duration,
    /// Zero runs until interrupted
    pub max_ticks: u64,
    pub seed_entries: usize,
    pub authors: usize,
    /// Every Nth local write is denied by the store; zero disables
    pub reject_every: u64,
    /// Every Nth tick fails one stream and restarts it; zero disables
    pub stream_failure_every: u64,
    pub sync: SyncConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(default)
        };

        let partitions: Vec<String> = lookup("FEED_PARTITIONS")
            .unwrap_or_else(|| format!("{PRAYER_PARTITION},{TESTIMONY_PARTITION}"))
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let defaults = SyncConfig::default();
        let sync = SyncConfig {
            metric_ttl_ms: number("FEED_METRIC_TTL_MS", defaults.metric_ttl_ms),
            metric_debounce_ms: number("FEED_METRIC_DEBOUNCE_MS", defaults.metric_debounce_ms),
            enrichment_interval_ms: number(
                "FEED_ENRICHMENT_INTERVAL_MS",
                defaults.enrichment_interval_ms,
            ),
            enrichment_batch_size: number(
                "FEED_ENRICHMENT_BATCH_SIZE",
                defaults.enrichment_batch_size as u64,
            ) as usize,
            offload_batch_threshold: number(
                "FEED_OFFLOAD_BATCH_THRESHOLD",
                defaults.offload_batch_threshold as u64,
            ) as usize,
            ..defaults
        };

        Self {
            partitions,
            tick_interval: Duration::from_millis(number("FEED_TICK_MS", 1000)),
            max_ticks: number("FEED_MAX_TICKS", 0),
            seed_entries: number("FEED_SEED_ENTRIES", 50) as usize,
            authors: number("FEED_AUTHORS", 12).max(1) as usize,
            reject_every: number("FEED_REJECT_EVERY", 5),
            stream_failure_every: number("FEED_STREAM_FAILURE_EVERY", 0),
            sync,
        }
    }
}
