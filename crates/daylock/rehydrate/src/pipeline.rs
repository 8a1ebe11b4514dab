//! Bounded, idempotent restore of remote history.

use std::collections::BTreeSet;
use std::sync::Arc;

use daylock_storage::{AttemptRecord, AttemptStore};
use tracing::{debug, info, instrument, warn};

use crate::config::RehydrationConfig;
use crate::error::{RehydrationError, Result};
use crate::remote::RemoteHistory;

/// Outcome of [`RehydrationPipeline::perform_rehydration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RehydrationResult {
    pub success: bool,
    /// Attempts newly written by this run, including runs that later failed.
    pub attempts_rehydrated: u64,
    pub error: Option<RehydrationError>,
}

impl RehydrationResult {
    fn succeeded(attempts_rehydrated: u64) -> Self {
        Self {
            success: true,
            attempts_rehydrated,
            error: None,
        }
    }

    fn failed(attempts_rehydrated: u64, error: RehydrationError) -> Self {
        Self {
            success: false,
            attempts_rehydrated,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct RehydrationPipeline {
    store: Arc<dyn AttemptStore>,
    remote: Arc<dyn RemoteHistory>,
    config: RehydrationConfig,
}

impl RehydrationPipeline {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        remote: Arc<dyn RemoteHistory>,
        config: RehydrationConfig,
    ) -> Self {
        Self {
            store,
            remote,
            config,
        }
    }

    pub fn config(&self) -> &RehydrationConfig {
        &self.config
    }

    /// Restore up to `max_attempts` of the user's most recent attempts on
    /// or after the floor date, together with their puzzles.
    ///
    /// Never returns an error: failures are reported in the result and
    /// writes made before the failure are kept.
    #[instrument(skip(self), name = "rehydration")]
    pub async fn perform_rehydration(&self, user_id: &str) -> RehydrationResult {
        let mut written = 0;
        match self.restore(user_id, &mut written).await {
            Ok(()) => {
                info!(attempts_rehydrated = written, "rehydration complete");
                RehydrationResult::succeeded(written)
            }
            Err(e) => {
                warn!(error = %e, attempts_rehydrated = written, "rehydration failed");
                RehydrationResult::failed(written, e)
            }
        }
    }

    async fn restore(&self, user_id: &str, written: &mut u64) -> Result<()> {
        let floor = self.config.floor_date;
        let mut attempts = self
            .remote
            .fetch_recent_attempts(user_id, floor, self.config.max_attempts)
            .await?;

        // The remote is trusted for neither bound.
        attempts.retain(|a| a.user_id == user_id && a.puzzle_date >= floor);
        attempts.truncate(self.config.max_attempts);
        debug!(fetched = attempts.len(), "remote attempts fetched");

        self.restore_puzzles(&attempts).await?;

        for attempt in attempts {
            if self.store.attempt_exists(&attempt.id).await? {
                continue;
            }
            if self
                .store
                .insert_attempt_if_absent(&attempt.into_synced())
                .await?
            {
                *written += 1;
            }
        }
        Ok(())
    }

    async fn restore_puzzles(&self, attempts: &[AttemptRecord]) -> Result<()> {
        let mut missing = Vec::new();
        let wanted: BTreeSet<&str> = attempts.iter().map(|a| a.puzzle_id.as_str()).collect();
        for puzzle_id in wanted {
            if !self.store.puzzle_exists(puzzle_id).await? {
                missing.push(puzzle_id.to_string());
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        let puzzles = self.remote.fetch_puzzles(&missing).await?;
        if puzzles.len() < missing.len() {
            warn!(
                requested = missing.len(),
                received = puzzles.len(),
                "backend is missing puzzles for some attempts"
            );
        }
        for puzzle in &puzzles {
            self.store.upsert_puzzle(puzzle).await?;
        }
        debug!(restored = puzzles.len(), "puzzles restored");
        Ok(())
    }
}

impl std::fmt::Debug for RehydrationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RehydrationPipeline")
            .field("max_attempts", &self.config.max_attempts)
            .field("floor_date", &self.config.floor_date)
            .finish()
    }
}
