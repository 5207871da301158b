//! Subscriptions module - lifecycle of push subscriptions per partition.

mod registry;

#[cfg(test)]
mod registry_tests;

pub use registry::{Subscription, SubscriptionRegistry};
