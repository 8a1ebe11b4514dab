use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one time-integrity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeStatus {
    /// A remote clock corroborated the device clock within the drift threshold.
    Verified,
    /// No remote clock was reachable; the device clock is used best-effort.
    Offline,
    /// The device clock cannot be trusted.
    Tampered,
}

impl std::fmt::Display for TimeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeStatus::Verified => write!(f, "verified"),
            TimeStatus::Offline => write!(f, "offline"),
            TimeStatus::Tampered => write!(f, "tampered"),
        }
    }
}

/// Where the reference time for a check came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSourceKind {
    /// Public timestamp service.
    WorldTime,
    /// Backend-hosted timestamp query.
    Backend,
    /// Persisted snapshot from the last successful sync.
    Cache,
    /// Device clock alone (no remote source and no cache).
    Device,
}

impl std::fmt::Display for TimeSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeSourceKind::WorldTime => write!(f, "worldtime"),
            TimeSourceKind::Backend => write!(f, "backend"),
            TimeSourceKind::Cache => write!(f, "cache"),
            TimeSourceKind::Device => write!(f, "device"),
        }
    }
}

/// Result of [`crate::TimeAuthority::sync`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeCheckResult {
    pub status: TimeStatus,
    pub authorized_date: NaiveDate,
    /// Device clock minus reference clock, in milliseconds.
    pub drift_ms: i64,
    pub source: TimeSourceKind,
    /// Device time captured at the start of the check.
    pub checked_at: DateTime<Utc>,
}

impl TimeCheckResult {
    pub fn is_tampered(&self) -> bool {
        self.status == TimeStatus::Tampered
    }
}

/// Snapshot persisted after every successful network sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeCache {
    pub server_time: DateTime<Utc>,
    pub client_time: DateTime<Utc>,
    pub authorized_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cache_uses_camel_case_layout() {
        let cache = TimeCache {
            server_time: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            client_time: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 1).unwrap(),
            authorized_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        };
        let json = serde_json::to_value(&cache).unwrap();

        assert_eq!(json["authorizedDate"], "2025-06-01");
        assert!(json.get("serverTime").is_some());
        assert!(json.get("clientTime").is_some());
    }

    #[test]
    fn source_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TimeSourceKind::WorldTime).unwrap(),
            "\"worldtime\""
        );
        assert_eq!(TimeSourceKind::WorldTime.to_string(), "worldtime");
    }
}
