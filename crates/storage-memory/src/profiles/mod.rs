//! In-memory author profile reads.

mod repository;

pub use repository::MemoryProfileRepository;
