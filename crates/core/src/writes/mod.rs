//! Writes module - optimistic local writes with rollback.

mod writes_model;
mod writes_service;
mod writes_traits;


pub use writes_model::{PendingWrite, WriteState};
pub use writes_service::OptimisticWriteManager;
pub use writes_traits::OptimisticWriteServiceTrait;
