use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::enrichment::EnrichmentBatcher;
use crate::events::FeedEventSink;
use crate::feed::{CountSourceTrait, FeedSourceTrait, ProfileReaderTrait, WriteGatewayTrait};
use crate::ingestion::IngestionPipeline;
use crate::metrics::DerivedMetricAggregator;
use crate::subscriptions::SubscriptionRegistry;
use crate::writes::OptimisticWriteManager;

/// Backend primitives and the event sink the engine is built from.
#[derive(Clone)]
pub struct FeedSyncDeps {
    pub source: Arc<dyn FeedSourceTrait>,
    pub profiles: Arc<dyn ProfileReaderTrait>,
    pub writes: Arc<dyn WriteGatewayTrait>,
    pub counts: Arc<dyn CountSourceTrait>,
    pub event_sink: Arc<dyn FeedEventSink>,
}

/// Owns the registry, pipeline, write manager, metric aggregator and
/// enrichment batcher for one session.
pub struct FeedSyncService {
    config: SyncConfig,
    pipeline: Arc<IngestionPipeline>,
    registry: SubscriptionRegistry,
    writes: Arc<OptimisticWriteManager>,
    metric: DerivedMetricAggregator,
    enrichment: Arc<EnrichmentBatcher>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl FeedSyncService {
    pub fn new(deps: FeedSyncDeps, config: SyncConfig) -> Self {
        let pipeline = Arc::new(IngestionPipeline::new());
        let registry = SubscriptionRegistry::new(
            deps.source,
            pipeline.clone(),
            deps.event_sink.clone(),
            config.offload_batch_threshold,
        );
        let writes = Arc::new(OptimisticWriteManager::new(
            pipeline.clone(),
            deps.writes,
            deps.event_sink.clone(),
        ));
        let metric = DerivedMetricAggregator::new(
            deps.counts,
            config.metric_sources.clone(),
            config.metric_ttl(),
            config.metric_debounce(),
            deps.event_sink,
        );
        let enrichment = Arc::new(EnrichmentBatcher::new(
            pipeline.clone(),
            deps.profiles,
            config.effective_batch_size(),
            config.enrichment_interval(),
        ));

        Self {
            config,
            pipeline,
            registry,
            writes,
            metric,
            enrichment,
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn pipeline(&self) -> Arc<IngestionPipeline> {
        self.pipeline.clone()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn writes(&self) -> Arc<OptimisticWriteManager> {
        self.writes.clone()
    }

    pub fn metric(&self) -> &DerivedMetricAggregator {
        &self.metric
    }

    pub fn enrichment(&self) -> Arc<EnrichmentBatcher> {
        self.enrichment.clone()
    }

    fn lock_background(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.background.lock().unwrap_or_else(|poisoned| {
            warn!("Background task list mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Starts the enrichment loop. Calling it again while tasks are running
    /// does nothing. Must be called from within a Tokio runtime.
    pub fn start_background(&self) {
        let mut tasks = self.lock_background();
        tasks.retain(|handle| !handle.is_finished());
        if !tasks.is_empty() {
            return;
        }
        tasks.push(self.enrichment.clone().start());
        info!("Feed sync background tasks started");
    }

    /// Aborts background tasks and stops every subscription.
    pub fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = self.lock_background().drain(..).collect();
        for handle in &tasks {
            handle.abort();
        }
        let stopped = self.registry.stop_all();
        info!(
            "Feed sync shut down ({} background tasks, {} subscriptions)",
            tasks.len(),
            stopped
        );
    }
}

impl Drop for FeedSyncService {
    fn drop(&mut self) {
        for handle in self.lock_background().drain(..) {
            handle.abort();
        }
    }
}
