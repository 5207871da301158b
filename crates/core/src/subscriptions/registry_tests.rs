#[cfg(test)]
mod tests {
    use crate::errors::{BackendError, Error, Result};
    use crate::events::RecordingEventSink;
    use crate::feed::{ChangeBatch, Delivery, Entry, FeedSourceTrait, ListenerRegistration};
    use crate::ingestion::IngestionPipeline;
    use crate::subscriptions::SubscriptionRegistry;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::{mpsc, Semaphore};

    // --- Mock FeedSource ---
    #[derive(Default)]
    struct MockFeedSource {
        senders: Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>,
        subscribe_calls: AtomicUsize,
        removed: Arc<AtomicUsize>,
        gate: Option<Arc<Semaphore>>,
        refuse: bool,
    }

    impl MockFeedSource {
        fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        fn push(&self, partition: &str, batch: ChangeBatch) -> bool {
            match self.senders.lock().unwrap().get(partition) {
                Some(tx) => tx.send(Delivery::Batch(batch)).is_ok(),
                None => false,
            }
        }

        fn fail(&self, partition: &str, message: &str) {
            if let Some(tx) = self.senders.lock().unwrap().remove(partition) {
                let _ = tx.send(Delivery::Failed(message.to_string()));
            }
        }
    }

    struct MockRegistration {
        removed: Arc<AtomicUsize>,
    }

    impl ListenerRegistration for MockRegistration {
        fn remove(&self) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl FeedSourceTrait for MockFeedSource {
        async fn subscribe(
            &self,
            partition: &str,
            deliveries: mpsc::UnboundedSender<Delivery>,
        ) -> Result<Box<dyn ListenerRegistration>> {
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            if self.refuse {
                return Err(BackendError::Unavailable("offline".to_string()).into());
            }
            self.senders
                .lock()
                .unwrap()
                .insert(partition.to_string(), deliveries);
            Ok(Box::new(MockRegistration {
                removed: self.removed.clone(),
            }))
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn entry(partition: &str, id: &str, secs: i64) -> Entry {
        Entry::new(
            id,
            partition,
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            json!({}),
        )
    }

    fn build_registry(
        source: Arc<MockFeedSource>,
        offload_batch_threshold: usize,
    ) -> (SubscriptionRegistry, Arc<IngestionPipeline>, RecordingEventSink) {
        let pipeline = Arc::new(IngestionPipeline::new());
        let sink = RecordingEventSink::new();
        let registry = SubscriptionRegistry::new(
            source,
            pipeline.clone(),
            Arc::new(sink.clone()),
            offload_batch_threshold,
        );
        (registry, pipeline, sink)
    }

    #[tokio::test]
    async fn test_concurrent_start_creates_one_subscription() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(MockFeedSource::gated(gate.clone()));
        let (registry, _pipeline, _sink) = build_registry(source.clone(), 200);

        let first = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.start_listening("prayer").await })
        };
        let second = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.start_listening("prayer").await })
        };
        settle().await;
        gate.add_permits(2);

        let started = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
        assert_eq!(started.iter().filter(|s| **s).count(), 1);
        assert_eq!(source.subscribe_calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.active_partitions(), vec!["prayer"]);
        assert!(registry.subscriptions()[0].active);
    }

    #[tokio::test]
    async fn test_sequential_start_is_idempotent() {
        let source = Arc::new(MockFeedSource::default());
        let (registry, _pipeline, _sink) = build_registry(source.clone(), 200);

        assert!(registry.start_listening("prayer").await.unwrap());
        assert!(!registry.start_listening("prayer").await.unwrap());
        assert_eq!(source.subscribe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deliveries_reach_snapshot() {
        let source = Arc::new(MockFeedSource::default());
        let (registry, pipeline, _sink) = build_registry(source.clone(), 200);
        registry.start_listening("testimony").await.unwrap();

        assert!(source.push(
            "testimony",
            ChangeBatch::upserts(vec![entry("testimony", "a", 1), entry("testimony", "b", 2)]),
        ));
        settle().await;

        assert_eq!(pipeline.snapshot("testimony").ids(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_large_batches_merge_on_blocking_pool() {
        let source = Arc::new(MockFeedSource::default());
        let (registry, pipeline, _sink) = build_registry(source.clone(), 2);
        registry.start_listening("prayer").await.unwrap();
        let mut rx = pipeline.watch("prayer");

        let batch = (0..5).map(|i| entry("prayer", &i.to_string(), i)).collect();
        source.push("prayer", ChangeBatch::upserts(batch));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 5);
    }

    #[tokio::test]
    async fn test_stop_cancels_and_clears() {
        let source = Arc::new(MockFeedSource::default());
        let (registry, pipeline, _sink) = build_registry(source.clone(), 200);
        registry.start_listening("prayer").await.unwrap();
        source.push("prayer", ChangeBatch::upserts(vec![entry("prayer", "a", 1)]));
        settle().await;

        assert!(registry.stop_listening("prayer"));
        assert!(!registry.stop_listening("prayer"));
        assert_eq!(source.removed.load(Ordering::SeqCst), 1);
        assert!(!registry.is_active("prayer"));
        assert!(pipeline.snapshot("prayer").is_empty());

        source.push("prayer", ChangeBatch::upserts(vec![entry("prayer", "late", 2)]));
        settle().await;
        assert!(pipeline.snapshot("prayer").is_empty());
    }

    #[tokio::test]
    async fn test_stop_while_starting_cancels_late_registration() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(MockFeedSource::gated(gate.clone()));
        let (registry, _pipeline, _sink) = build_registry(source.clone(), 200);

        let start = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.start_listening("prayer").await })
        };
        settle().await;
        assert!(registry.is_active("prayer"));
        assert!(!registry.subscriptions()[0].active);

        assert!(registry.stop_listening("prayer"));
        gate.add_permits(1);

        assert!(!start.await.unwrap().unwrap());
        assert_eq!(source.removed.load(Ordering::SeqCst), 1);
        assert!(!registry.is_active("prayer"));
    }

    #[tokio::test]
    async fn test_transport_failure_marks_inactive_and_surfaces() {
        let source = Arc::new(MockFeedSource::default());
        let (registry, pipeline, sink) = build_registry(source.clone(), 200);
        registry.start_listening("prayer").await.unwrap();
        source.push("prayer", ChangeBatch::upserts(vec![entry("prayer", "a", 1)]));
        settle().await;

        source.fail("prayer", "connection reset");
        settle().await;

        assert!(!registry.is_active("prayer"));
        assert_eq!(pipeline.snapshot("prayer").ids(), vec!["a"]);
        assert_eq!(
            sink.subscription_failures(),
            vec![("prayer".to_string(), "connection reset".to_string())]
        );

        // No automatic retry; the caller resubscribes.
        assert_eq!(source.subscribe_calls.load(Ordering::SeqCst), 1);
        assert!(registry.start_listening("prayer").await.unwrap());
        assert_eq!(registry.subscriptions()[0].epoch, 2);
    }

    #[tokio::test]
    async fn test_subscribe_error_releases_slot() {
        let source = Arc::new(MockFeedSource {
            refuse: true,
            ..MockFeedSource::default()
        });
        let (registry, _pipeline, _sink) = build_registry(source, 200);

        let err = registry.start_listening("prayer").await.unwrap_err();
        assert!(matches!(err, Error::Subscription { ref partition, .. } if partition == "prayer"));
        assert!(!registry.is_active("prayer"));
    }

    #[tokio::test]
    async fn test_stop_all_cancels_every_subscription() {
        let source = Arc::new(MockFeedSource::default());
        let (registry, _pipeline, _sink) = build_registry(source.clone(), 200);
        registry.start_listening("prayer").await.unwrap();
        registry.start_listening("testimony").await.unwrap();

        assert_eq!(registry.stop_all(), 2);
        assert_eq!(source.removed.load(Ordering::SeqCst), 2);
        assert!(registry.active_partitions().is_empty());
        assert_eq!(registry.stop_all(), 0);
    }
}
