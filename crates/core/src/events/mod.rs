//! Feed events module.
//!
//! Provides the event types and the sink trait through which rollbacks,
//! stream failures and metric updates reach upstream consumers.

mod feed_event;
mod sink;

pub use feed_event::*;
pub use sink::*;
