//! In-memory document counts.

mod repository;

pub use repository::MemoryCountRepository;
