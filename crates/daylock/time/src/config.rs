//! Time-integrity configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How often a continuous tampered episode is reported to the error collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TamperReportCadence {
    /// Report on every check that detects tampering, either by drift or
    /// by a clock rollback against the cache. An offline recheck during a
    /// tampered episode keeps the status but detects nothing, so it only
    /// leaves a breadcrumb.
    #[default]
    EveryCheck,
    /// Report the first detection of an episode; stay quiet until a
    /// non-tampered check closes it.
    OncePerEpisode,
}

/// Configuration for [`crate::TimeAuthority`] and its network sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// Per-source fetch timeout in milliseconds.
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,

    /// Absolute drift above which the device clock is classified tampered.
    #[serde(default = "default_drift_threshold_ms")]
    pub drift_threshold_ms: i64,

    #[serde(default)]
    pub tamper_report_cadence: TamperReportCadence,

    /// Primary public timestamp endpoint.
    #[serde(default = "default_worldtime_url")]
    pub worldtime_url: String,

    /// Secondary backend-hosted timestamp endpoint.
    #[serde(default)]
    pub backend_time_url: Option<String>,

    /// Bearer token sent to the backend timestamp endpoint.
    #[serde(default)]
    pub backend_api_key: Option<String>,

    /// Key-value key holding the persisted time cache.
    #[serde(default = "default_cache_key")]
    pub cache_key: String,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            source_timeout_ms: default_source_timeout_ms(),
            drift_threshold_ms: default_drift_threshold_ms(),
            tamper_report_cadence: TamperReportCadence::default(),
            worldtime_url: default_worldtime_url(),
            backend_time_url: None,
            backend_api_key: None,
            cache_key: default_cache_key(),
        }
    }
}

impl TimeConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn with_cadence(mut self, cadence: TamperReportCadence) -> Self {
        self.tamper_report_cadence = cadence;
        self
    }

    pub fn with_backend(mut self, url: impl Into<String>, api_key: Option<String>) -> Self {
        self.backend_time_url = Some(url.into());
        self.backend_api_key = api_key;
        self
    }
}

fn default_source_timeout_ms() -> u64 {
    5_000
}

fn default_drift_threshold_ms() -> i64 {
    5 * 60 * 1_000
}

fn default_worldtime_url() -> String {
    "https://worldtimeapi.org/api/timezone/Etc/UTC".to_string()
}

fn default_cache_key() -> String {
    "daylock.time_cache".to_string()
}
