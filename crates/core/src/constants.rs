use std::time::Duration;

/// How long a computed metric value is served without recomputation.
pub const DEFAULT_METRIC_TTL: Duration = Duration::from_secs(60);

/// Window in which metric update requests are coalesced.
pub const DEFAULT_METRIC_DEBOUNCE: Duration = Duration::from_millis(500);

/// Interval between enrichment cycles.
pub const DEFAULT_ENRICHMENT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Maximum number of keys per point-read request accepted by the backend.
pub const DEFAULT_ENRICHMENT_BATCH_SIZE: usize = 10;

/// Batches at least this large are merged on the blocking pool.
pub const DEFAULT_OFFLOAD_BATCH_THRESHOLD: usize = 200;

/// Metric sources used when none are configured.
pub const DEFAULT_METRIC_SOURCES: [&str; 2] = ["unread_messages", "unread_notifications"];

/// Partitions of the community feed.
pub const PRAYER_PARTITION: &str = "prayer";
pub const TESTIMONY_PARTITION: &str = "testimony";
