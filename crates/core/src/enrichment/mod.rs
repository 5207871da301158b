//! Enrichment module - batched resolution of author references.

mod batcher;
mod enrichment_model;


pub use batcher::EnrichmentBatcher;
pub use enrichment_model::{EnrichmentReport, EnrichmentTarget};
