//! Wiring of the trust layer from configuration.

use std::sync::Arc;

use daylock_rehydrate::{
    HttpRemoteHistory, InMemoryRemoteHistory, RehydrationFlagStore, RehydrationPipeline,
    RehydrationProbe, RemoteHistory,
};
use daylock_storage::{AttemptRecord, AttemptStore, FileKeyValueStore, KeyValueStore, QueryWindow};
use daylock_time::{
    build_http_client, BackendTimeSource, TimeAuthority, TimeCacheStore, TimeSource,
    WorldTimeSource,
};
use daylock_types::{Clock, ErrorReporter, SystemClock, TracingReporter};
use serde::Serialize;
use tracing::warn;

use crate::config::DaylockConfig;
use crate::error::Result;
use crate::integrity_gate::IntegrityGate;
use crate::lifecycle::AppLifecycle;
use crate::pipeline::TrustPipeline;
use crate::rehydration_gate::RehydrationGate;

/// A locally stored attempt and the game type of its cached puzzle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub attempt: AttemptRecord,
    /// `None` when the puzzle is not cached locally.
    pub game_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryReport {
    pub user_id: String,
    /// Attempts stored on this install, all users.
    pub stored_attempts: u64,
    /// This user's attempts still queued for outbound sync.
    pub pending_sync: usize,
    /// Newest first.
    pub recent: Vec<HistoryEntry>,
}

/// Shared collaborators, built once per process.
#[derive(Clone)]
pub struct Services {
    pub config: DaylockConfig,
    pub clock: Arc<dyn Clock>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub kv: Arc<dyn KeyValueStore>,
    pub attempts: Arc<dyn AttemptStore>,
    pub remote: Arc<dyn RemoteHistory>,
    pub lifecycle: Arc<AppLifecycle>,
}

impl Services {
    /// Open local stores and build network clients from `config`.
    pub async fn open(config: DaylockConfig) -> Result<Self> {
        let kv: Arc<dyn KeyValueStore> =
            Arc::new(FileKeyValueStore::open(&config.storage.data_dir).await?);
        let attempts = open_attempt_store(&config).await?;

        let remote: Arc<dyn RemoteHistory> =
            match HttpRemoteHistory::from_config(&config.rehydration)? {
                Some(remote) => Arc::new(remote),
                None => {
                    warn!("no remote history configured, rehydration will find nothing");
                    Arc::new(InMemoryRemoteHistory::new())
                }
            };

        Ok(Self {
            config,
            clock: Arc::new(SystemClock),
            reporter: Arc::new(TracingReporter),
            kv,
            attempts,
            remote,
            lifecycle: Arc::new(AppLifecycle::default()),
        })
    }

    /// Network time sources in fallback order.
    pub fn time_sources(&self) -> Result<Vec<Arc<dyn TimeSource>>> {
        let time = &self.config.time;
        let client = build_http_client(time.source_timeout())?;

        let mut sources: Vec<Arc<dyn TimeSource>> = vec![Arc::new(WorldTimeSource::new(
            client.clone(),
            time.worldtime_url.clone(),
        ))];
        if let Some(url) = &time.backend_time_url {
            sources.push(Arc::new(BackendTimeSource::new(
                client,
                url.clone(),
                time.backend_api_key.clone(),
            )));
        }
        Ok(sources)
    }

    pub fn time_authority(&self, sources: Vec<Arc<dyn TimeSource>>) -> TimeAuthority {
        TimeAuthority::new(
            self.config.time.clone(),
            self.clock.clone(),
            sources,
            TimeCacheStore::new(self.kv.clone(), self.config.time.cache_key.clone()),
            self.reporter.clone(),
        )
    }

    pub fn flag_store(&self) -> RehydrationFlagStore {
        RehydrationFlagStore::new(self.kv.clone(), self.clock.clone(), &self.config.rehydration)
    }

    pub fn rehydration_gate(&self, user_id: &str) -> RehydrationGate {
        let rehydration = &self.config.rehydration;
        RehydrationGate::new(
            user_id,
            self.attempts.clone(),
            RehydrationProbe::new(self.attempts.clone(), self.remote.clone(), rehydration.clone()),
            RehydrationPipeline::new(
                self.attempts.clone(),
                self.remote.clone(),
                rehydration.clone(),
            ),
            self.flag_store(),
            self.config.gate.clone(),
        )
    }

    /// Summary of what local storage holds for `user_id`.
    pub async fn history(&self, user_id: &str, limit: usize) -> Result<HistoryReport> {
        let attempts = self
            .attempts
            .list_attempts(user_id, QueryWindow::first(limit))
            .await?;

        let mut recent = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            let game_type = self
                .attempts
                .get_puzzle(&attempt.puzzle_id)
                .await?
                .map(|puzzle| puzzle.game_type);
            recent.push(HistoryEntry { attempt, game_type });
        }

        let pending_sync = self
            .attempts
            .pending_sync()
            .await?
            .iter()
            .filter(|a| a.user_id == user_id)
            .count();

        Ok(HistoryReport {
            user_id: user_id.to_string(),
            stored_attempts: self.attempts.attempt_count().await?,
            pending_sync,
            recent,
        })
    }

    /// Full startup pipeline for `user_id` using the given time sources.
    pub fn trust_pipeline(
        &self,
        user_id: &str,
        sources: Vec<Arc<dyn TimeSource>>,
    ) -> TrustPipeline {
        let integrity = IntegrityGate::new(self.time_authority(sources), self.lifecycle.clone());
        TrustPipeline::new(Arc::new(integrity), self.rehydration_gate(user_id))
    }
}

#[cfg(feature = "sqlite")]
async fn open_attempt_store(config: &DaylockConfig) -> Result<Arc<dyn AttemptStore>> {
    let url = config.storage.database_url();
    let store = daylock_storage::SqliteAttemptStore::connect(&url).await?;
    tracing::info!(%url, "attempt store opened");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_attempt_store(_config: &DaylockConfig) -> Result<Arc<dyn AttemptStore>> {
    warn!("built without sqlite, attempts are kept in memory");
    Ok(Arc::new(daylock_storage::InMemoryAttemptStore::new()))
}
