//! Periodic resolution of author references.
//!
//! Instead of one subscription per referenced author, a fixed-interval cycle
//! collects the distinct keys referenced by the current snapshots and reads
//! the ones not resolved within the last interval in bounded batches.
//! Denormalized fields can therefore lag by up to one interval.
//!
//! Freshness is measured from the start of the cycle that fetched a key, so
//! a key resolved by one tick is due again at the next one no matter how
//! long the read took. The cache only holds keys referenced by the last
//! cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use super::enrichment_model::{EnrichmentReport, EnrichmentTarget};
use crate::errors::Error;
use crate::feed::{AuthorProfile, ProfileReaderTrait};
use crate::ingestion::IngestionPipeline;

struct CachedTarget {
    target: EnrichmentTarget,
    /// Start of the cycle that fetched the key
    fetched_at: Instant,
}

pub struct EnrichmentBatcher {
    pipeline: Arc<IngestionPipeline>,
    reader: Arc<dyn ProfileReaderTrait>,
    batch_size: usize,
    interval: Duration,
    cache: DashMap<String, CachedTarget>,
}

impl EnrichmentBatcher {
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        reader: Arc<dyn ProfileReaderTrait>,
        batch_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            pipeline,
            reader,
            batch_size: batch_size.max(1),
            interval,
            cache: DashMap::new(),
        }
    }

    /// Cached resolution for `key`, if any.
    pub fn cached(&self, key: &str) -> Option<EnrichmentTarget> {
        self.cache.get(key).map(|cached| cached.target.clone())
    }

    /// Number of keys currently cached.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn is_due(&self, key: &str, started: Instant) -> bool {
        self.cache.get(key).map_or(true, |cached| {
            started.saturating_duration_since(cached.fetched_at) >= self.interval
        })
    }

    /// Runs one enrichment cycle starting now.
    pub async fn run_cycle(&self) -> EnrichmentReport {
        self.run_cycle_at(Instant::now()).await
    }

    async fn run_cycle_at(&self, started: Instant) -> EnrichmentReport {
        let referenced = self.pipeline.author_ids();
        let resolved_at = Utc::now();
        let due: Vec<String> = referenced
            .iter()
            .filter(|key| self.is_due(key, started))
            .cloned()
            .collect();

        let mut report = EnrichmentReport {
            keys_referenced: referenced.len(),
            keys_requested: due.len(),
            ..EnrichmentReport::default()
        };

        let batches: Vec<&[String]> = due.chunks(self.batch_size).collect();
        report.requests_sent = batches.len();

        let results = join_all(batches.iter().map(|keys| async move {
            (*keys, self.reader.read_profiles(keys).await)
        }))
        .await;

        for (keys, result) in results {
            match result {
                Ok(profiles) => {
                    report.profiles_resolved += profiles.len();
                    self.store(keys, profiles, started, resolved_at);
                }
                Err(err) => {
                    report.failed_batches += 1;
                    let error = Error::enrichment_fetch(keys.len(), err.to_string());
                    warn!("{}; entries keep their previous values", error);
                }
            }
        }

        let resolved: HashMap<String, AuthorProfile> = referenced
            .iter()
            .filter_map(|key| {
                let cached = self.cache.get(key)?;
                cached.target.value.clone().map(|profile| (key.clone(), profile))
            })
            .collect();
        report.entries_updated = self.pipeline.apply_profiles(&resolved);

        let before = self.cache.len();
        self.cache.retain(|key, _| referenced.contains(key));
        let evicted = before.saturating_sub(self.cache.len());
        if evicted > 0 {
            debug!("Evicted {} author(s) no longer referenced", evicted);
        }

        debug!("Enrichment cycle finished: {:?}", report);
        report
    }

    /// Records a batch result. Keys the backend did not return are cached as
    /// unresolved so they are not re-requested before the next interval.
    fn store(
        &self,
        keys: &[String],
        profiles: Vec<AuthorProfile>,
        fetched_at: Instant,
        resolved_at: chrono::DateTime<Utc>,
    ) {
        let mut by_key: HashMap<String, AuthorProfile> = profiles
            .into_iter()
            .map(|profile| (profile.id.clone(), profile))
            .collect();

        for key in keys {
            let value = by_key.remove(key);
            self.cache.insert(
                key.clone(),
                CachedTarget {
                    target: EnrichmentTarget {
                        key: key.clone(),
                        resolved_at,
                        value,
                    },
                    fetched_at,
                },
            );
        }
    }

    /// Starts the periodic cycle. The first cycle runs immediately.
    ///
    /// Each cycle is stamped with its tick deadline. Consecutive deadlines
    /// are at least one interval apart, so every key fetched by a tick is due
    /// at the next one.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Enrichment batcher started ({:?} interval, {} keys per request)",
                self.interval, self.batch_size
            );
            let mut ticker = interval(self.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let started = ticker.tick().await;
                self.run_cycle_at(started).await;
            }
        })
    }
}
