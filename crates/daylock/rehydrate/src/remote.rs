//! Backend history API.

use async_trait::async_trait;
use chrono::NaiveDate;
use daylock_storage::{AttemptRecord, PuzzleRecord};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::RehydrationConfig;
use crate::error::{RehydrationError, Result};

/// Read-only view of a user's history held by the backend.
#[async_trait]
pub trait RemoteHistory: Send + Sync {
    /// Number of attempts by `user_id` on puzzles dated on or after `since`.
    async fn count_attempts_since(&self, user_id: &str, since: NaiveDate) -> Result<u64>;

    /// Up to `limit` of the user's most recent attempts dated on or after
    /// `since`, newest first.
    async fn fetch_recent_attempts(
        &self,
        user_id: &str,
        since: NaiveDate,
        limit: usize,
    ) -> Result<Vec<AttemptRecord>>;

    /// Puzzles with the given ids. Unknown ids are omitted.
    async fn fetch_puzzles(&self, puzzle_ids: &[String]) -> Result<Vec<PuzzleRecord>>;
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

/// [`RemoteHistory`] over the backend's JSON HTTP API.
///
/// - `GET <base>/users/<id>/attempts/count?since=YYYY-MM-DD` → `{"count": n}`
/// - `GET <base>/users/<id>/attempts?since=YYYY-MM-DD&limit=n` → `[attempt]`
/// - `GET <base>/puzzles?ids=a,b,c` → `[puzzle]`, at most
///   [`Self::PUZZLE_BATCH_SIZE`] ids per request
#[derive(Debug, Clone)]
pub struct HttpRemoteHistory {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpRemoteHistory {
    /// Puzzle ids sent per `GET /puzzles` request.
    pub const PUZZLE_BATCH_SIZE: usize = 50;

    pub fn new(base_url: &str, api_key: Option<String>, client: Client) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            RehydrationError::Configuration(format!("invalid remote base url {base_url:?}: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RehydrationError::Configuration(format!(
                "remote base url {base_url} cannot carry a path"
            )));
        }
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Build from configuration; `None` when no remote is configured.
    pub fn from_config(config: &RehydrationConfig) -> Result<Option<Self>> {
        let Some(base_url) = config.remote_base_url.as_deref() else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RehydrationError::Configuration(format!("http client: {e}")))?;
        Self::new(base_url, config.api_key.clone(), client).map(Some)
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RehydrationError::Configuration("base url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<T> {
        debug!(%url, "remote history request");
        let mut request = self.client.get(url).query(query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RehydrationError::RemoteStatus {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RemoteHistory for HttpRemoteHistory {
    async fn count_attempts_since(&self, user_id: &str, since: NaiveDate) -> Result<u64> {
        let url = self.url(&["users", user_id, "attempts", "count"])?;
        let body: CountResponse = self.get(url, &[("since", since.to_string())]).await?;
        Ok(body.count)
    }

    async fn fetch_recent_attempts(
        &self,
        user_id: &str,
        since: NaiveDate,
        limit: usize,
    ) -> Result<Vec<AttemptRecord>> {
        let url = self.url(&["users", user_id, "attempts"])?;
        self.get(
            url,
            &[("since", since.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn fetch_puzzles(&self, puzzle_ids: &[String]) -> Result<Vec<PuzzleRecord>> {
        let mut puzzles = Vec::with_capacity(puzzle_ids.len());
        for batch in puzzle_ids.chunks(Self::PUZZLE_BATCH_SIZE) {
            let url = self.url(&["puzzles"])?;
            let mut page: Vec<PuzzleRecord> = self.get(url, &[("ids", batch.join(","))]).await?;
            debug!(requested = batch.len(), received = page.len(), "puzzle batch fetched");
            puzzles.append(&mut page);
        }
        Ok(puzzles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(base: &str) -> HttpRemoteHistory {
        HttpRemoteHistory::new(base, None, Client::new()).unwrap()
    }

    #[test]
    fn user_ids_are_escaped_into_one_segment() {
        let url = remote("https://api.example.com/v1/")
            .url(&["users", "a/b c", "attempts"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/users/a%2Fb%20c/attempts"
        );
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(HttpRemoteHistory::new("not a url", None, Client::new()).is_err());
        assert!(HttpRemoteHistory::new("mailto:ops@example.com", None, Client::new()).is_err());
    }

    #[test]
    fn absent_base_url_means_no_remote() {
        let config = RehydrationConfig::default();
        assert!(HttpRemoteHistory::from_config(&config).unwrap().is_none());
    }
}
