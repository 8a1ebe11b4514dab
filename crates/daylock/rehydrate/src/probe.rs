use std::sync::Arc;

use daylock_storage::AttemptStore;
use tracing::{debug, instrument, warn};

use crate::config::RehydrationConfig;
use crate::remote::RemoteHistory;

/// Why the probe decided what it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The local store already holds attempts.
    LocalDataPresent,
    /// Local store is empty and so is the backend (a genuinely new user).
    NoRemoteHistory,
    /// Local store is empty but the backend holds history: restore it.
    Needed { remote_attempts: u64 },
    /// Local or remote lookup failed; treated as "not needed".
    Unavailable,
}

impl ProbeOutcome {
    pub fn needs_rehydration(&self) -> bool {
        matches!(self, ProbeOutcome::Needed { .. })
    }
}

/// Read-only check for lost local state.
#[derive(Clone)]
pub struct RehydrationProbe {
    store: Arc<dyn AttemptStore>,
    remote: Arc<dyn RemoteHistory>,
    config: RehydrationConfig,
}

impl RehydrationProbe {
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

    #[instrument(skip(self), name = "rehydration_probe")]
    pub async fn probe(&self, user_id: &str) -> ProbeOutcome {
        let local = match self.store.attempt_count().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "local attempt count failed");
                return ProbeOutcome::Unavailable;
            }
        };
        if local > 0 {
            debug!(local, "local history present");
            return ProbeOutcome::LocalDataPresent;
        }

        match self
            .remote
            .count_attempts_since(user_id, self.config.floor_date)
            .await
        {
            Ok(0) => ProbeOutcome::NoRemoteHistory,
            Ok(remote_attempts) => {
                debug!(remote_attempts, "local store empty but backend has history");
                ProbeOutcome::Needed { remote_attempts }
            }
            Err(e) => {
                warn!(error = %e, "remote attempt count failed");
                ProbeOutcome::Unavailable
            }
        }
    }

    /// True iff the local store is empty and the backend has at least one
    /// attempt on or after the floor date. Never errors.
    pub async fn needs_rehydration(&self, user_id: &str) -> bool {
        self.probe(user_id).await.needs_rehydration()
    }
}

impl std::fmt::Debug for RehydrationProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RehydrationProbe")
            .field("floor_date", &self.config.floor_date)
            .finish()
    }
}
