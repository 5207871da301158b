//! Ingestion module - per-partition merging and snapshot publication.

mod partition_state;
mod pipeline;


pub use pipeline::{IngestionPipeline, SnapshotObserver};
