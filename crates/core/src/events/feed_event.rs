//! Feed event types.

use serde::{Deserialize, Serialize};

use crate::feed::Entry;

/// Events emitted by the engine for upstream consumers.
///
/// Snapshots themselves travel through observers and watch channels; these
/// events carry the outcomes a UI has to react to explicitly.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// An optimistic write was removed from its partition.
    /// The entry is tagged `Rejected` so the caller can undo its UI change.
    WriteRolledBack {
        correlation_id: String,
        entry: Entry,
        reason: String,
    },

    /// A push stream failed mid-flight. The partition is no longer active.
    SubscriptionFailed { partition: String, message: String },

    /// The derived metric was recomputed and published.
    MetricUpdated { value: u64 },
}

impl FeedEvent {
    pub fn write_rolled_back(
        correlation_id: impl Into<String>,
        entry: Entry,
        reason: impl Into<String>,
    ) -> Self {
        Self::WriteRolledBack {
            correlation_id: correlation_id.into(),
            entry,
            reason: reason.into(),
        }
    }

    pub fn subscription_failed(partition: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SubscriptionFailed {
            partition: partition.into(),
            message: message.into(),
        }
    }

    pub fn metric_updated(value: u64) -> Self {
        Self::MetricUpdated { value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_event_serialization() {
        let event = FeedEvent::subscription_failed("prayer", "stream reset");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("subscription_failed"));

        let deserialized: FeedEvent = serde_json::from_str(&json).unwrap();
        match deserialized {
            FeedEvent::SubscriptionFailed { partition, message } => {
                assert_eq!(partition, "prayer");
                assert_eq!(message, "stream reset");
            }
            _ => panic!("Expected SubscriptionFailed"),
        }
    }
}
