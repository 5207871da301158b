//! Metrics module - derived values computed from remote counts.

mod aggregator;
mod flight;


pub use aggregator::{DerivedMetricAggregator, MetricCache};
pub use flight::FlightState;
