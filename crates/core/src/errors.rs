//! Core error types for the feed sync engine.
//!
//! This module defines backend-agnostic error types. Backend-specific errors
//! (transport, document store, etc.) are converted to [`BackendError`] by the
//! implementations of the primitives in [`crate::feed`].

use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the feed sync engine.
///
/// The first four variants form the error taxonomy surfaced by the
/// components; the remaining ones describe invalid input or a failing
/// primitive before it has been classified.
#[derive(Error, Debug)]
pub enum Error {
    /// A push stream failed. Surfaces to the caller, never retried.
    #[error("Subscription to partition '{partition}' failed: {message}")]
    Subscription { partition: String, message: String },

    /// The server refused an optimistic write. The pending entry is rolled back.
    #[error("Write for entry '{entry_id}' was rejected: {reason}")]
    WriteRejected { entry_id: String, reason: String },

    /// One of the metric sources failed. Absorbed by the aggregator.
    #[error("Metric source '{source_name}' failed: {message}")]
    AggregationSource {
        source_name: String,
        message: String,
    },

    /// A batch of point reads failed. Absorbed by the enrichment batcher.
    #[error("Enrichment fetch for {key_count} key(s) failed: {message}")]
    EnrichmentFetch { key_count: usize, message: String },

    #[error("Backend operation failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    pub fn subscription(partition: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscription {
            partition: partition.into(),
            message: message.into(),
        }
    }

    pub fn write_rejected(entry_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteRejected {
            entry_id: entry_id.into(),
            reason: reason.into(),
        }
    }

    pub fn aggregation_source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AggregationSource {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn enrichment_fetch(key_count: usize, message: impl Into<String>) -> Self {
        Self::EnrichmentFetch {
            key_count,
            message: message.into(),
        }
    }
}

/// Backend-agnostic error type for the consumed primitives.
///
/// This enum uses `String` for all error details, allowing backends to
/// convert their own errors into this format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the request (validation, permissions, conflict).
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// A batched read asked for more keys than the backend accepts.
    #[error("Batch of {requested} keys exceeds the limit of {limit}")]
    BatchTooLarge { requested: usize, limit: usize },

    /// Internal/unexpected backend error.
    #[error("Internal backend error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_messages() {
        let err = Error::subscription("prayer", "stream reset");
        assert_eq!(
            err.to_string(),
            "Subscription to partition 'prayer' failed: stream reset"
        );

        let err = Error::write_rejected("x", "permission denied");
        assert_eq!(
            err.to_string(),
            "Write for entry 'x' was rejected: permission denied"
        );
    }

    #[test]
    fn test_backend_error_converts() {
        let err: Error = BackendError::BatchTooLarge {
            requested: 11,
            limit: 10,
        }
        .into();
        assert!(matches!(err, Error::Backend(BackendError::BatchTooLarge { .. })));
    }
}
