//! Rehydration policy and remote endpoint configuration.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RehydrationConfig {
    /// Maximum number of remote attempts restored in one run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Earliest puzzle date restored.
    #[serde(default = "default_floor_date")]
    pub floor_date: NaiveDate,

    /// Base URL of the backend history API.
    #[serde(default)]
    pub remote_base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Prefix of the per-(install, user) completion flag key.
    #[serde(default = "default_flag_key_prefix")]
    pub flag_key_prefix: String,

    /// Key holding the persisted installation identifier.
    #[serde(default = "default_install_id_key")]
    pub install_id_key: String,
}

impl Default for RehydrationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            floor_date: default_floor_date(),
            remote_base_url: None,
            api_key: None,
            request_timeout_ms: default_request_timeout_ms(),
            flag_key_prefix: default_flag_key_prefix(),
            install_id_key: default_install_id_key(),
        }
    }
}

impl RehydrationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_floor_date(mut self, floor_date: NaiveDate) -> Self {
        self.floor_date = floor_date;
        self
    }
}

fn default_max_attempts() -> usize {
    500
}

fn default_floor_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_flag_key_prefix() -> String {
    "daylock.rehydrated".to_string()
}

fn default_install_id_key() -> String {
    "daylock.install_id".to_string()
}
