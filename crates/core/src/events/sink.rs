//! Destinations for feed events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::FeedEvent;
use crate::feed::Entry;

/// Receives rollbacks, stream failures and metric publications.
///
/// The pipeline and the write manager emit while holding a partition lock,
/// so `emit` has to return quickly and must not call back into the engine.
pub trait FeedEventSink: Send + Sync {
    fn emit(&self, event: FeedEvent);
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEventSink;

impl FeedEventSink for NullEventSink {
    fn emit(&self, _event: FeedEvent) {}
}

/// Keeps every event in emission order, with accessors per event kind.
///
/// Clones share the same log, so a test can hand one clone to the engine
/// and inspect another.
#[derive(Clone, Default)]
pub struct RecordingEventSink {
    log: Arc<Mutex<Vec<FeedEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_log(&self) -> MutexGuard<'_, Vec<FeedEvent>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<FeedEvent> {
        self.lock_log().clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<FeedEvent> {
        std::mem::take(&mut *self.lock_log())
    }

    pub fn len(&self) -> usize {
        self.lock_log().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_log().is_empty()
    }

    /// Entries of every rolled-back write, as handed to upstream.
    pub fn rolled_back_entries(&self) -> Vec<Entry> {
        self.lock_log()
            .iter()
            .filter_map(|event| match event {
                FeedEvent::WriteRolledBack { entry, .. } => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(partition, message)` of every failed subscription.
    pub fn subscription_failures(&self) -> Vec<(String, String)> {
        self.lock_log()
            .iter()
            .filter_map(|event| match event {
                FeedEvent::SubscriptionFailed { partition, message } => {
                    Some((partition.clone(), message.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Every published metric value, oldest first.
    pub fn metric_values(&self) -> Vec<u64> {
        self.lock_log()
            .iter()
            .filter_map(|event| match event {
                FeedEvent::MetricUpdated { value } => Some(*value),
                _ => None,
            })
            .collect()
    }
}

impl FeedEventSink for RecordingEventSink {
    fn emit(&self, event: FeedEvent) {
        self.lock_log().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_null_sink_accepts_events() {
        NullEventSink.emit(FeedEvent::metric_updated(3));
    }

    #[test]
    fn test_recording_sink_splits_events_by_kind() {
        let sink = RecordingEventSink::new();
        let shared = sink.clone();
        let entry = Entry::new("x", "prayer", Utc::now(), json!({}));

        shared.emit(FeedEvent::metric_updated(7));
        shared.emit(FeedEvent::subscription_failed("testimony", "reset"));
        shared.emit(FeedEvent::write_rolled_back("c-1", entry, "denied"));
        shared.emit(FeedEvent::metric_updated(9));

        assert_eq!(sink.len(), 4);
        assert_eq!(sink.metric_values(), vec![7, 9]);
        assert_eq!(
            sink.subscription_failures(),
            vec![("testimony".to_string(), "reset".to_string())]
        );
        assert_eq!(sink.rolled_back_entries()[0].id, "x");

        assert_eq!(sink.take().len(), 4);
        assert!(sink.is_empty());
    }
}
