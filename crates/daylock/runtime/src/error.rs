use daylock_rehydrate::RehydrationError;
use daylock_storage::StorageError;
use daylock_time::TimeError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors raised while assembling or configuring the runtime.
///
/// Gate operations themselves never fail; they degrade into a status.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("telemetry error: {0}")]
    Telemetry(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Time(#[from] TimeError),

    #[error(transparent)]
    Rehydration(#[from] RehydrationError),
}

impl From<config::ConfigError> for RuntimeError {
    fn from(e: config::ConfigError) -> Self {
        RuntimeError::Config(e.to_string())
    }
}
