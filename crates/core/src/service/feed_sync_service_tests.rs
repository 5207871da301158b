#[cfg(test)]
mod tests {
    use crate::config::SyncConfig;
    use crate::errors::Result;
    use crate::events::RecordingEventSink;
    use crate::feed::{
        AuthorProfile, ChangeBatch, CountSourceTrait, Delivery, Entry, FeedSourceTrait,
        ListenerRegistration, ProfileReaderTrait, Provenance, WriteGatewayTrait,
    };
    use crate::service::{FeedSyncDeps, FeedSyncService};
    use crate::writes::{OptimisticWriteServiceTrait, WriteState};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    // --- Mock backend implementing every primitive ---
    #[derive(Default)]
    struct MockBackend {
        senders: Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>,
        removed: Arc<AtomicUsize>,
        profile_reads: AtomicUsize,
    }

    impl MockBackend {
        fn push(&self, partition: &str, batch: ChangeBatch) {
            let senders = self.senders.lock().unwrap();
            senders[partition].send(Delivery::Batch(batch)).unwrap();
        }
    }

    struct MockRegistration(Arc<AtomicUsize>);

    impl ListenerRegistration for MockRegistration {
        fn remove(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl FeedSourceTrait for MockBackend {
        async fn subscribe(
            &self,
            partition: &str,
            deliveries: mpsc::UnboundedSender<Delivery>,
        ) -> Result<Box<dyn ListenerRegistration>> {
            self.senders
                .lock()
                .unwrap()
                .insert(partition.to_string(), deliveries);
            Ok(Box::new(MockRegistration(self.removed.clone())))
        }
    }

    #[async_trait]
    impl ProfileReaderTrait for MockBackend {
        async fn read_profiles(&self, keys: &[String]) -> Result<Vec<AuthorProfile>> {
            self.profile_reads.fetch_add(1, Ordering::SeqCst);
            Ok(keys
                .iter()
                .map(|key| AuthorProfile {
                    id: key.clone(),
                    display_name: key.to_uppercase(),
                    photo_url: None,
                })
                .collect())
        }
    }

    #[async_trait]
    impl WriteGatewayTrait for MockBackend {
        async fn write(&self, _entry: &Entry) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl CountSourceTrait for MockBackend {
        async fn count(&self, source: &str) -> Result<u64> {
            Ok(if source == "unread_messages" { 3 } else { 4 })
        }
    }

    fn build_service() -> (FeedSyncService, Arc<MockBackend>, RecordingEventSink) {
        let backend = Arc::new(MockBackend::default());
        let sink = RecordingEventSink::new();
        let deps = FeedSyncDeps {
            source: backend.clone(),
            profiles: backend.clone(),
            writes: backend.clone(),
            counts: backend.clone(),
            event_sink: Arc::new(sink.clone()),
        };
        (FeedSyncService::new(deps, SyncConfig::default()), backend, sink)
    }

    fn entry(id: &str, secs: i64) -> Entry {
        let created_at = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        Entry::new(id, "prayer", created_at, json!({ "text": id })).with_author_id("ana")
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_components_share_one_pipeline() {
        let (service, backend, _sink) = build_service();

        assert!(service.registry().start_listening("prayer").await.unwrap());
        backend.push("prayer", ChangeBatch::upserts(vec![entry("a", 1)]));
        settle().await;

        let write = service.writes().submit_write(entry("b", 2)).await.unwrap();
        assert_eq!(write.state, WriteState::Confirmed);

        let report = service.enrichment().run_cycle().await;
        assert_eq!(report.keys_requested, 1);

        let snapshot = service.pipeline().snapshot("prayer");
        assert_eq!(snapshot.ids(), vec!["b", "a"]);
        assert!(snapshot
            .entries
            .iter()
            .all(|e| e.author.as_ref().map(|a| a.display_name.as_str()) == Some("ANA")));
        assert_eq!(snapshot.get("b").unwrap().provenance, Provenance::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metric_uses_configured_sources() {
        let (service, _backend, _sink) = build_service();

        assert_eq!(service.metric().request_update(), None);
        tokio::time::sleep(service.config().metric_debounce() + Duration::from_millis(1)).await;

        assert_eq!(service.metric().value(), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_background_is_idempotent() {
        let (service, backend, _sink) = build_service();
        service.registry().start_listening("prayer").await.unwrap();
        backend.push("prayer", ChangeBatch::upserts(vec![entry("a", 1)]));
        settle().await;

        service.start_background();
        service.start_background();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(backend.profile_reads.load(Ordering::SeqCst), 1);
        service.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_stops_every_subscription() {
        let (service, backend, _sink) = build_service();
        service.registry().start_listening("prayer").await.unwrap();
        service.registry().start_listening("testimony").await.unwrap();
        service.start_background();

        service.shutdown();

        assert!(service.registry().active_partitions().is_empty());
        assert_eq!(backend.removed.load(Ordering::SeqCst), 2);
        assert!(service.pipeline().snapshot("prayer").is_empty());
    }
}
