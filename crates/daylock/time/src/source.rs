//! Network time sources.
//!
//! Sources are tried in order by [`crate::TimeAuthority`]; each one only has
//! to answer "what time is it" or fail. Timeouts are applied by the caller.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, TimeError};
use crate::model::TimeSourceKind;

/// A remote clock.
#[async_trait]
pub trait TimeSource: Send + Sync {
    fn kind(&self) -> TimeSourceKind;

    /// Fetch the remote clock's current time.
    async fn fetch_time(&self) -> Result<DateTime<Utc>>;
}

/// Build the HTTP client shared by the network sources.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TimeError::Configuration(format!("failed to build http client: {e}")))
}

fn unavailable(source_kind: TimeSourceKind, e: reqwest::Error) -> TimeError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.to_string()
    };
    TimeError::SourceUnavailable {
        source_kind,
        reason,
    }
}

#[derive(Debug, Deserialize)]
struct WorldTimePayload {
    #[serde(default)]
    utc_datetime: Option<String>,
    #[serde(default)]
    unixtime: Option<i64>,
}

impl WorldTimePayload {
    fn into_timestamp(self) -> std::result::Result<DateTime<Utc>, String> {
        if let Some(raw) = self.utc_datetime {
            return DateTime::parse_from_rfc3339(&raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| format!("bad utc_datetime {raw:?}: {e}"));
        }
        match self.unixtime {
            Some(secs) => Utc
                .timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| format!("unixtime {secs} out of range")),
            None => Err("payload has neither utc_datetime nor unixtime".to_string()),
        }
    }
}

/// Public timestamp service (worldtimeapi-compatible JSON).
#[derive(Debug, Clone)]
pub struct WorldTimeSource {
    client: reqwest::Client,
    url: String,
}

impl WorldTimeSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TimeSource for WorldTimeSource {
    fn kind(&self) -> TimeSourceKind {
        TimeSourceKind::WorldTime
    }

    async fn fetch_time(&self) -> Result<DateTime<Utc>> {
        let kind = self.kind();
        let payload: WorldTimePayload = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| unavailable(kind, e))?
            .json()
            .await
            .map_err(|e| TimeError::InvalidPayload {
                source_kind: kind,
                reason: e.to_string(),
            })?;

        let server_time = payload
            .into_timestamp()
            .map_err(|reason| TimeError::InvalidPayload {
                source_kind: kind,
                reason,
            })?;
        debug!(%server_time, "worldtime answered");
        Ok(server_time)
    }
}

#[derive(Debug, Deserialize)]
struct ServerTimePayload {
    #[serde(rename = "serverTime", alias = "server_time")]
    server_time: DateTime<Utc>,
}

/// Backend-hosted timestamp endpoint returning `{"serverTime": "<RFC 3339>"}`.
#[derive(Debug, Clone)]
pub struct BackendTimeSource {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl BackendTimeSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl TimeSource for BackendTimeSource {
    fn kind(&self) -> TimeSourceKind {
        TimeSourceKind::Backend
    }

    async fn fetch_time(&self) -> Result<DateTime<Utc>> {
        let kind = self.kind();
        let mut request = self.client.get(&self.url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let payload: ServerTimePayload = request
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| unavailable(kind, e))?
            .json()
            .await
            .map_err(|e| TimeError::InvalidPayload {
                source_kind: kind,
                reason: e.to_string(),
            })?;

        debug!(server_time = %payload.server_time, "backend time answered");
        Ok(payload.server_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worldtime_payload_prefers_utc_datetime() {
        let payload: WorldTimePayload = serde_json::from_str(
            r#"{"utc_datetime":"2025-06-01T12:00:00.123456+00:00","unixtime":1}"#,
        )
        .unwrap();
        let ts = payload.into_timestamp().unwrap();
        assert_eq!(ts.timestamp(), 1_748_779_200);
    }

    #[test]
    fn worldtime_payload_falls_back_to_unixtime() {
        let payload: WorldTimePayload =
            serde_json::from_str(r#"{"unixtime":1748779200}"#).unwrap();
        assert_eq!(
            payload.into_timestamp().unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn worldtime_payload_without_time_is_rejected() {
        let payload: WorldTimePayload = serde_json::from_str(r#"{"timezone":"UTC"}"#).unwrap();
        assert!(payload.into_timestamp().is_err());
    }

    #[test]
    fn server_time_payload_accepts_both_spellings() {
        let camel: ServerTimePayload =
            serde_json::from_str(r#"{"serverTime":"2025-06-01T12:00:00Z"}"#).unwrap();
        let snake: ServerTimePayload =
            serde_json::from_str(r#"{"server_time":"2025-06-01T12:00:00Z"}"#).unwrap();
        assert_eq!(camel.server_time, snake.server_time);
    }
}
