//! Derived metric aggregation (the unread badge).
//!
//! The value is the sum of two remote counts. Requests are served from a TTL
//! cache when fresh; otherwise they are debounced and funneled through
//! [`FlightState`] so that at most one recomputation runs at a time and a
//! request that arrives mid-flight causes exactly one follow-up run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::Instant;

use super::flight::FlightState;
use crate::errors::{Error, Result};
use crate::events::{FeedEvent, FeedEventSink};
use crate::feed::CountSourceTrait;

/// Cached metric value.
#[derive(Clone, Debug)]
pub struct MetricCache {
    pub value: Option<u64>,
    /// `None` until the first successful computation, or after invalidation.
    pub computed_at: Option<Instant>,
    pub ttl: Duration,
}

impl MetricCache {
    fn new(ttl: Duration) -> Self {
        Self {
            value: None,
            computed_at: None,
            ttl,
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        match (self.value, self.computed_at) {
            (Some(_), Some(at)) => now.saturating_duration_since(at) < self.ttl,
            _ => false,
        }
    }
}

struct AggregatorState {
    flight: FlightState,
    cache: MetricCache,
}

struct AggregatorInner {
    counts: Arc<dyn CountSourceTrait>,
    sources: [String; 2],
    debounce: Duration,
    state: Mutex<AggregatorState>,
    publisher: watch::Sender<Option<u64>>,
    event_sink: Arc<dyn FeedEventSink>,
    computations: AtomicU64,
}

impl AggregatorInner {
    fn lock_state(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Metric aggregator mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    async fn count(&self, source: &str) -> Result<u64> {
        self.counts
            .count(source)
            .await
            .map_err(|err| Error::aggregation_source(source, err.to_string()))
    }

    /// Runs one recomputation. Failures keep the previous value.
    async fn recompute(&self) {
        let run = self.computations.fetch_add(1, Ordering::SeqCst) + 1;
        let [first, second] = &self.sources;
        debug!("Recomputing metric (run {}) from '{}' + '{}'", run, first, second);

        let (a, b) = tokio::join!(self.count(first), self.count(second));
        let total = match (a, b) {
            (Ok(a), Ok(b)) => match a.checked_add(b) {
                Some(total) => total,
                None => {
                    let err = Error::aggregation_source(
                        format!("{first}+{second}"),
                        format!("sum of {a} and {b} overflows"),
                    );
                    warn!("{}; keeping the previous metric value", err);
                    return;
                }
            },
            (a, b) => {
                for err in [a.err(), b.err()].into_iter().flatten() {
                    warn!("{}; keeping the previous metric value", err);
                }
                return;
            }
        };

        {
            let mut state = self.lock_state();
            state.cache.value = Some(total);
            state.cache.computed_at = Some(Instant::now());
        }
        self.publisher.send_replace(Some(total));
        self.event_sink.emit(FeedEvent::metric_updated(total));
        info!("Metric updated to {}", total);
    }

    /// Recomputes until no repeat is owed.
    async fn run_flight(&self) {
        loop {
            self.recompute().await;
            if !self.lock_state().flight.finish() {
                break;
            }
            debug!("Repeat requested during recomputation, running once more");
        }
    }
}

/// Returns the flight to `Idle` if the scheduling task ends without
/// finishing, either because it panicked or because it was aborted.
struct FlightGuard {
    inner: Arc<AggregatorInner>,
    armed: bool,
}

impl FlightGuard {
    fn new(inner: Arc<AggregatorInner>) -> Self {
        Self { inner, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.lock_state();
        warn!(
            "Metric recomputation ended abnormally in state {}, resetting to Idle",
            state.flight
        );
        state.flight.abandon();
    }
}

/// Maintains one derived number from two remote counts.
#[derive(Clone)]
pub struct DerivedMetricAggregator {
    inner: Arc<AggregatorInner>,
}

impl DerivedMetricAggregator {
    pub fn new(
        counts: Arc<dyn CountSourceTrait>,
        sources: [String; 2],
        ttl: Duration,
        debounce: Duration,
        event_sink: Arc<dyn FeedEventSink>,
    ) -> Self {
        let (publisher, _) = watch::channel(None);
        Self {
            inner: Arc::new(AggregatorInner {
                counts,
                sources,
                debounce,
                state: Mutex::new(AggregatorState {
                    flight: FlightState::Idle,
                    cache: MetricCache::new(ttl),
                }),
                publisher,
                event_sink,
                computations: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the current value, scheduling a refresh when it is stale.
    ///
    /// A fresh cached value is returned with nothing scheduled. Must be
    /// called from within a Tokio runtime.
    pub fn request_update(&self) -> Option<u64> {
        let (value, start_timer) = {
            let mut state = self.inner.lock_state();
            if state.cache.is_fresh(Instant::now()) {
                return state.cache.value;
            }
            let start_timer = state.flight.request();
            (state.cache.value, start_timer)
        };

        if start_timer {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                let guard = FlightGuard::new(inner.clone());
                tokio::time::sleep(inner.debounce).await;
                let begin = inner.lock_state().flight.begin();
                if begin {
                    inner.run_flight().await;
                }
                guard.disarm();
            });
        }
        value
    }

    /// Marks the cached value stale; the next request recomputes.
    pub fn invalidate(&self) {
        self.inner.lock_state().cache.computed_at = None;
    }

    /// Last published value, without scheduling anything.
    pub fn value(&self) -> Option<u64> {
        self.inner.lock_state().cache.value
    }

    pub fn cache(&self) -> MetricCache {
        self.inner.lock_state().cache.clone()
    }

    pub fn flight_state(&self) -> FlightState {
        self.inner.lock_state().flight
    }

    /// Receiver notified on every published value.
    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.inner.publisher.subscribe()
    }

    /// Number of recomputations started so far.
    pub fn computation_count(&self) -> u64 {
        self.inner.computations.load(Ordering::SeqCst)
    }
}
