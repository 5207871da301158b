//! Storage-specific error types for the in-memory backend.
//!
//! These errors are internal to the storage layer and are converted to
//! `feedsync_core::Error` before being returned to the engine.

use feedsync_core::errors::{BackendError, Error};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store is offline")]
    Offline,

    #[error("Write for document '{0}' denied by store rules")]
    WriteDenied(String),

    #[error("Read of {requested} keys exceeds the limit of {limit}")]
    ReadBatchTooLarge { requested: usize, limit: usize },

    #[error("Count query for '{0}' failed")]
    CountFailed(String),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        let backend = match err {
            StorageError::Offline => BackendError::Unavailable(err.to_string()),
            StorageError::WriteDenied(_) => BackendError::Rejected(err.to_string()),
            StorageError::ReadBatchTooLarge { requested, limit } => {
                BackendError::BatchTooLarge { requested, limit }
            }
            StorageError::CountFailed(_) => BackendError::Internal(err.to_string()),
        };
        Error::Backend(backend)
    }
}
