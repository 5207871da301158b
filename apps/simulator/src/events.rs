//! Event sink bridging engine events into the tracing log.

use feedsync_core::events::{FeedEvent, FeedEventSink};
use tracing::{info, warn};

pub struct TracingEventSink;

impl FeedEventSink for TracingEventSink {
    fn emit(&self, event: FeedEvent) {
        match event {
            FeedEvent::WriteRolledBack {
                correlation_id,
                entry,
                reason,
            } => warn!(
                correlation_id = %correlation_id,
                entry_id = %entry.id,
                partition = %entry.partition,
                "Write rolled back: {}",
                reason
            ),
            FeedEvent::SubscriptionFailed { partition, message } => {
                warn!(partition = %partition, "Subscription failed: {}", message)
            }
            FeedEvent::MetricUpdated { value } => info!(badge = value, "Unread badge updated"),
        }
    }
}
