//! Error types for daylock-time.
//!
//! None of these escape [`crate::TimeAuthority::sync`]; they are logged and
//! folded into the fallback chain.

use daylock_storage::StorageError;
use thiserror::Error;

use crate::model::TimeSourceKind;

/// Errors raised by time sources and the time cache.
#[derive(Debug, Error)]
pub enum TimeError {
    /// Source could not be reached or answered with an error status.
    #[error("{source_kind} time source unavailable: {reason}")]
    SourceUnavailable {
        source_kind: TimeSourceKind,
        reason: String,
    },

    /// Source did not answer within the configured timeout.
    #[error("{source_kind} time source timed out after {timeout_ms}ms")]
    SourceTimeout {
        source_kind: TimeSourceKind,
        timeout_ms: u64,
    },

    /// Source answered with a body that carries no usable timestamp.
    #[error("{source_kind} time source returned an invalid payload: {reason}")]
    InvalidPayload {
        source_kind: TimeSourceKind,
        reason: String,
    },

    /// Persisted time cache could not be read or written.
    #[error("time cache error: {0}")]
    Cache(#[from] StorageError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for time operations.
pub type Result<T> = std::result::Result<T, TimeError>;
