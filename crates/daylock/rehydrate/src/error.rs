use daylock_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RehydrationError>;

/// Failures while probing or restoring remote history.
///
/// Variants carry rendered messages so results can be cloned into gate
/// state and shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RehydrationError {
    #[error("remote request failed: {0}")]
    Remote(String),

    #[error("remote returned {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    #[error("invalid remote payload: {0}")]
    InvalidPayload(String),

    #[error("local storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<StorageError> for RehydrationError {
    fn from(e: StorageError) -> Self {
        RehydrationError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for RehydrationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RehydrationError::InvalidPayload(e.to_string())
        } else {
            RehydrationError::Remote(e.to_string())
        }
    }
}

impl From<serde_json::Error> for RehydrationError {
    fn from(e: serde_json::Error) -> Self {
        RehydrationError::InvalidPayload(e.to_string())
    }
}
