//! Startup gate that restores lost history before gameplay starts.
//!
//! `idle → checking → (complete | rehydrating → complete | error)`.

use std::sync::Arc;

use daylock_rehydrate::{ProbeOutcome, RehydrationFlagStore, RehydrationPipeline, RehydrationProbe};
use daylock_storage::AttemptStore;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{watch, OwnedMutexGuard};
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::GateConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RehydrationStatus {
    Idle,
    Checking,
    Rehydrating,
    Complete {
        attempts_restored: u64,
        /// Storage never became ready; gameplay released without checking.
        degraded: bool,
    },
    Error {
        message: String,
    },
}

impl RehydrationStatus {
    fn complete(attempts_restored: u64) -> Self {
        RehydrationStatus::Complete {
            attempts_restored,
            degraded: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RehydrationStatus::Complete { .. } | RehydrationStatus::Error { .. }
        )
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, RehydrationStatus::Complete { .. })
    }

    pub fn overlay(&self) -> Overlay {
        match self {
            RehydrationStatus::Idle | RehydrationStatus::Checking => Overlay::Contentless,
            RehydrationStatus::Rehydrating => Overlay::Progress,
            RehydrationStatus::Error { .. } => Overlay::RetryPrompt,
            RehydrationStatus::Complete { .. } => Overlay::None,
        }
    }
}

/// What the gate shows over the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Overlay {
    None,
    /// Blank loading screen while checking.
    Contentless,
    /// "Restoring your progress".
    Progress,
    /// Failure with a retry button.
    RetryPrompt,
}

struct Inner {
    user_id: String,
    store: Arc<dyn AttemptStore>,
    probe: RehydrationProbe,
    pipeline: RehydrationPipeline,
    flags: RehydrationFlagStore,
    config: GateConfig,
    status: watch::Sender<RehydrationStatus>,
    /// Held by the running task, not by callers.
    guard: Arc<tokio::sync::Mutex<()>>,
    in_flight: Mutex<Option<AbortHandle>>,
}

#[derive(Clone)]
pub struct RehydrationGate {
    inner: Arc<Inner>,
}

impl RehydrationGate {
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn AttemptStore>,
        probe: RehydrationProbe,
        pipeline: RehydrationPipeline,
        flags: RehydrationFlagStore,
        config: GateConfig,
    ) -> Self {
        let (status, _) = watch::channel(RehydrationStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                user_id: user_id.into(),
                store,
                probe,
                pipeline,
                flags,
                config,
                status,
                guard: Arc::new(tokio::sync::Mutex::new(())),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn status(&self) -> RehydrationStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RehydrationStatus> {
        self.inner.status.subscribe()
    }

    pub fn overlay(&self) -> Overlay {
        self.status().overlay()
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    /// Run the gate once. Later calls return the terminal status; calls made
    /// while a run is in flight wait for it instead of starting another.
    ///
    /// The run itself is owned by a background task: dropping this future
    /// stops waiting but does not cancel the work. Use [`Self::unmount`].
    pub async fn run(&self) -> RehydrationStatus {
        let Ok(guard) = self.inner.guard.clone().try_lock_owned() else {
            debug!("rehydration already running, waiting for it");
            return self.wait_terminal().await;
        };
        let current = self.status();
        if current.is_terminal() {
            return current;
        }
        self.drive(guard, false).await
    }

    /// Re-run the gate, ignoring both the previous outcome and the
    /// completion flag.
    pub async fn retry_rehydration(&self) -> RehydrationStatus {
        let guard = self.inner.guard.clone().lock_owned().await;
        info!(user_id = %self.inner.user_id, "manual rehydration retry");
        self.inner.status.send_replace(RehydrationStatus::Idle);
        self.drive(guard, true).await
    }

    /// Abort any in-flight run.
    pub fn unmount(&self) {
        if let Some(handle) = self.inner.in_flight.lock().take() {
            handle.abort();
            self.inner.status.send_if_modified(|status| {
                if status.is_terminal() {
                    return false;
                }
                *status = RehydrationStatus::Error {
                    message: "rehydration cancelled".to_string(),
                };
                true
            });
            debug!("in-flight rehydration aborted");
        }
    }

    /// Spawn one run holding `guard` until it finishes or is aborted.
    async fn drive(&self, guard: OwnedMutexGuard<()>, bypass_flag: bool) -> RehydrationStatus {
        let task = {
            let mut in_flight = self.inner.in_flight.lock();
            let inner = self.inner.clone();
            let task = tokio::spawn(async move {
                let _guard = guard;
                let status = inner.execute(bypass_flag).await;
                inner.in_flight.lock().take();
                status
            });
            *in_flight = Some(task.abort_handle());
            task
        };

        match task.await {
            Ok(status) => status,
            Err(e) => {
                debug!(error = %e, "rehydration task ended early");
                self.status()
            }
        }
    }

    async fn wait_terminal(&self) -> RehydrationStatus {
        let mut rx = self.inner.status.subscribe();
        let status = match rx.wait_for(RehydrationStatus::is_terminal).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        };
        status
    }
}

impl Inner {
    fn publish(&self, status: RehydrationStatus) -> RehydrationStatus {
        debug!(?status, "rehydration gate");
        self.status.send_replace(status.clone());
        status
    }

    #[instrument(skip(self), fields(user_id = %self.user_id))]
    async fn execute(&self, bypass_flag: bool) -> RehydrationStatus {
        self.publish(RehydrationStatus::Checking);

        if !self.wait_for_storage().await {
            warn!(
                max_wait_ms = self.config.readiness_max_wait_ms,
                "local storage not ready, releasing without rehydration"
            );
            return self.publish(RehydrationStatus::Complete {
                attempts_restored: 0,
                degraded: true,
            });
        }

        if !bypass_flag {
            match self.flags.is_complete(&self.user_id).await {
                Ok(true) => {
                    debug!("already rehydrated on this install");
                    return self.publish(RehydrationStatus::complete(0));
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "rehydration flag unreadable, probing anyway"),
            }
        }

        match self.probe.probe(&self.user_id).await {
            ProbeOutcome::Needed { remote_attempts } => {
                info!(remote_attempts, "restoring history from backend");
            }
            outcome => {
                debug!(?outcome, "no rehydration needed");
                return self.publish(RehydrationStatus::complete(0));
            }
        }

        self.publish(RehydrationStatus::Rehydrating);
        let result = self.pipeline.perform_rehydration(&self.user_id).await;
        match result.error {
            None => {
                if let Err(e) = self
                    .flags
                    .mark_complete(&self.user_id, result.attempts_rehydrated)
                    .await
                {
                    warn!(error = %e, "failed to persist rehydration flag");
                }
                self.publish(RehydrationStatus::complete(result.attempts_rehydrated))
            }
            Some(e) => self.publish(RehydrationStatus::Error {
                message: e.to_string(),
            }),
        }
    }

    /// Wait for the store's readiness signal, re-checking on an interval,
    /// for at most `readiness_max_wait`.
    async fn wait_for_storage(&self) -> bool {
        let readiness = self.store.readiness();
        let poll = self.config.readiness_poll_interval();
        let wait = async {
            loop {
                if readiness.is_ready() {
                    return;
                }
                tokio::select! {
                    _ = readiness.wait() => return,
                    _ = tokio::time::sleep(poll) => {}
                }
            }
        };
        tokio::time::timeout(self.config.readiness_max_wait(), wait)
            .await
            .is_ok()
    }
}

impl std::fmt::Debug for RehydrationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RehydrationGate")
            .field("user_id", &self.inner.user_id)
            .field("status", &self.status())
            .finish()
    }
}
