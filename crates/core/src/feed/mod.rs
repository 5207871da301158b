//! Feed module - domain models and the primitives consumed from the backend.

mod feed_model;
mod feed_traits;

pub use feed_model::{
    causal_order, AuthorProfile, ChangeBatch, Delivery, Entry, FeedSnapshot, Provenance,
};
pub use feed_traits::{
    CountSourceTrait, FeedSourceTrait, ListenerRegistration, ProfileReaderTrait,
    WriteGatewayTrait,
};
