//! Runtime configuration.
//!
//! Layered: built-in defaults, then an optional file, then `DAYLOCK_`
//! environment variables with `__` between nested keys
//! (`DAYLOCK_TIME__DRIFT_THRESHOLD_MS=120000`).

use std::path::PathBuf;
use std::time::Duration;

use daylock_rehydrate::RehydrationConfig;
use daylock_time::TimeConfig;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaylockConfig {
    #[serde(default)]
    pub time: TimeConfig,

    #[serde(default)]
    pub rehydration: RehydrationConfig,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rehydration gate timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Interval between storage readiness re-checks.
    #[serde(default = "default_readiness_poll_interval_ms")]
    pub readiness_poll_interval_ms: u64,

    /// Upper bound on waiting for storage before proceeding degraded.
    #[serde(default = "default_readiness_max_wait_ms")]
    pub readiness_max_wait_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            readiness_poll_interval_ms: default_readiness_poll_interval_ms(),
            readiness_max_wait_ms: default_readiness_max_wait_ms(),
        }
    }
}

impl GateConfig {
    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }

    pub fn readiness_max_wait(&self) -> Duration {
        Duration::from_millis(self.readiness_max_wait_ms)
    }
}

/// Local persistence locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the key-value store (time cache, flags, install id).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Attempt store URL. Defaults to `daylock.db` inside `data_dir`.
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_url: None,
        }
    }
}

impl StorageConfig {
    pub fn database_url(&self) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            format!("sqlite://{}?mode=rwc", self.data_dir.join("daylock.db").display())
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_readiness_poll_interval_ms() -> u64 {
    100
}

fn default_readiness_max_wait_ms() -> u64 {
    5_000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".daylock")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaylockConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&DaylockConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DAYLOCK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}
