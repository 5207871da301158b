//! Simulated traffic against the in-memory store.
//!
//! Remote posts are written straight into the store, local posts go through
//! the optimistic write path, and counts drift so the badge keeps changing.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use feedsync_core::feed::{AuthorProfile, Entry};
use feedsync_core::writes::OptimisticWriteServiceTrait;
use feedsync_core::FeedSyncService;
use feedsync_storage_memory::MemoryStore;

use crate::config::Config;

const LOCAL_AUTHOR: &str = "local-user";

fn author_id(index: usize) -> String {
    format!("author-{index:02}")
}

fn new_entry(partition: &str, author: &str, text: String) -> Entry {
    Entry::new(
        Uuid::now_v7().to_string(),
        partition,
        Utc::now(),
        json!({ "text": text }),
    )
    .with_author_id(author)
}

/// Fills the store with profiles, initial posts and counts.
pub fn seed(store: &MemoryStore, config: &Config) {
    for index in 0..config.authors {
        store.put_profile(AuthorProfile {
            id: author_id(index),
            display_name: format!("Member {index}"),
            photo_url: None,
        });
    }
    store.put_profile(AuthorProfile {
        id: LOCAL_AUTHOR.to_string(),
        display_name: "You".to_string(),
        photo_url: None,
    });

    for partition in &config.partitions {
        let entries = (0..config.seed_entries)
            .map(|i| {
                let author = author_id(i % config.authors);
                new_entry(partition, &author, format!("{partition} #{i}"))
            })
            .collect();
        store.upsert(partition, entries);
    }

    let [messages, notifications] = &config.sync.metric_sources;
    store.set_count(messages, 3);
    store.set_count(notifications, 4);
    info!(
        "Seeded {} entries in {} partition(s) from {} authors",
        config.seed_entries * config.partitions.len(),
        config.partitions.len(),
        config.authors
    );
}

pub struct TrafficDriver {
    store: Arc<MemoryStore>,
    service: Arc<FeedSyncService>,
    config: Config,
    tick: u64,
    writes: u64,
}

impl TrafficDriver {
    pub fn new(store: Arc<MemoryStore>, service: Arc<FeedSyncService>, config: Config) -> Self {
        Self {
            store,
            service,
            config,
            tick: 0,
            writes: 0,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick += 1;
            self.step().await?;
            if self.config.max_ticks > 0 && self.tick >= self.config.max_ticks {
                info!("Reached {} ticks, stopping", self.tick);
                return Ok(());
            }
        }
    }

    fn partition(&self) -> Option<&str> {
        let partitions = &self.config.partitions;
        if partitions.is_empty() {
            return None;
        }
        Some(&partitions[(self.tick as usize) % partitions.len()])
    }

    async fn step(&mut self) -> Result<()> {
        self.reconnect().await?;
        let Some(partition) = self.partition().map(str::to_string) else {
            return Ok(());
        };

        let author = author_id(self.tick as usize % self.config.authors);
        self.store.upsert(
            &partition,
            vec![new_entry(&partition, &author, format!("remote post {}", self.tick))],
        );

        self.local_write(&partition).await;

        let [messages, _] = &self.config.sync.metric_sources;
        self.store.set_count(messages, 3 + self.tick % 4);
        self.service.metric().request_update();

        let every = self.config.stream_failure_every;
        if every > 0 && self.tick % every == 0 {
            self.store.fail_stream(&partition, "simulated transport failure");
        }

        self.report();
        Ok(())
    }

    /// Restarts partitions whose stream failed since the last tick.
    async fn reconnect(&self) -> Result<()> {
        let registry = self.service.registry();
        for partition in &self.config.partitions {
            if !registry.is_active(partition) && registry.start_listening(partition).await? {
                info!(partition = %partition, "Reconnected");
            }
        }
        Ok(())
    }

    async fn local_write(&mut self, partition: &str) {
        self.writes += 1;
        let entry = new_entry(partition, LOCAL_AUTHOR, format!("local post {}", self.writes));
        let every = self.config.reject_every;
        if every > 0 && self.writes % every == 0 {
            self.store.deny_writes(&entry.id);
        }

        match self.service.writes().submit_write(entry).await {
            Ok(write) => debug!(correlation_id = %write.correlation_id, "Local write confirmed"),
            Err(err) => warn!("Local write failed: {}", err),
        }
    }

    fn report(&self) {
        let pipeline = self.service.pipeline();
        for partition in &self.config.partitions {
            let snapshot = pipeline.snapshot(partition);
            let pending = snapshot.entries.iter().filter(|e| e.is_pending()).count();
            let enriched = snapshot.entries.iter().filter(|e| e.author.is_some()).count();
            info!(
                partition = %partition,
                version = snapshot.version,
                entries = snapshot.len(),
                pending,
                enriched,
                active = self.service.registry().is_active(partition),
                "Snapshot"
            );
        }
        info!(
            tick = self.tick,
            badge = ?self.service.metric().value(),
            "Tick complete"
        );
    }
}
