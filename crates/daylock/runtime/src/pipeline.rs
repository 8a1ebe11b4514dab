//! Ordered startup stages and the combined view the app renders.
//!
//! Integrity runs first, then rehydration. Gameplay is released once
//! rehydration completes; a tampered clock covers everything with a
//! blocking overlay but leaves the app mounted underneath.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::integrity_gate::{IntegrityGate, IntegrityState, IntegrityStatus};
use crate::rehydration_gate::{Overlay, RehydrationGate, RehydrationStatus};

/// Coarse status of one startup stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    /// Finished and not holding anything back.
    Passed,
    /// Finished, but the app must be covered until a retry succeeds.
    Blocked,
    Failed(String),
}

#[async_trait]
pub trait StartupStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn stage_status(&self) -> StageStatus;

    async fn run(&self) -> StageStatus;

    async fn retry(&self) -> StageStatus;

    fn shutdown(&self);
}

#[async_trait]
impl StartupStage for IntegrityGate {
    fn name(&self) -> &'static str {
        "integrity"
    }

    fn stage_status(&self) -> StageStatus {
        integrity_stage_status(&self.state())
    }

    async fn run(&self) -> StageStatus {
        integrity_stage_status(&self.mount().await)
    }

    async fn retry(&self) -> StageStatus {
        integrity_stage_status(&IntegrityGate::retry(self).await)
    }

    fn shutdown(&self) {
        self.unmount();
    }
}

fn integrity_stage_status(state: &IntegrityState) -> StageStatus {
    match state.status {
        IntegrityStatus::Initializing => StageStatus::Running,
        IntegrityStatus::Verified | IntegrityStatus::Offline => StageStatus::Passed,
        IntegrityStatus::Tampered => StageStatus::Blocked,
    }
}

#[async_trait]
impl StartupStage for RehydrationGate {
    fn name(&self) -> &'static str {
        "rehydration"
    }

    fn stage_status(&self) -> StageStatus {
        rehydration_stage_status(&self.status())
    }

    async fn run(&self) -> StageStatus {
        rehydration_stage_status(&RehydrationGate::run(self).await)
    }

    async fn retry(&self) -> StageStatus {
        rehydration_stage_status(&self.retry_rehydration().await)
    }

    fn shutdown(&self) {
        self.unmount();
    }
}

fn rehydration_stage_status(status: &RehydrationStatus) -> StageStatus {
    match status {
        RehydrationStatus::Idle => StageStatus::Pending,
        RehydrationStatus::Checking | RehydrationStatus::Rehydrating => StageStatus::Running,
        RehydrationStatus::Complete { .. } => StageStatus::Passed,
        RehydrationStatus::Error { message } => StageStatus::Failed(message.clone()),
    }
}

/// Overlay the app shows, highest precedence first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrustOverlay {
    /// Device clock tampered; blocks everything.
    Tampered,
    /// Restoring history.
    Restoring,
    /// Startup checks still running.
    Loading,
    RehydrationFailed { message: String },
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustView {
    pub integrity: IntegrityState,
    pub rehydration: RehydrationStatus,
    pub overlay: TrustOverlay,
    pub gameplay_released: bool,
}

pub struct TrustPipeline {
    integrity: Arc<IntegrityGate>,
    rehydration: RehydrationGate,
    stages: Vec<Arc<dyn StartupStage>>,
}

impl TrustPipeline {
    pub fn new(integrity: Arc<IntegrityGate>, rehydration: RehydrationGate) -> Self {
        let stages: Vec<Arc<dyn StartupStage>> =
            vec![integrity.clone(), Arc::new(rehydration.clone())];
        Self {
            integrity,
            rehydration,
            stages,
        }
    }

    pub fn stages(&self) -> &[Arc<dyn StartupStage>] {
        &self.stages
    }

    pub fn integrity(&self) -> &IntegrityGate {
        &self.integrity
    }

    pub fn rehydration(&self) -> &RehydrationGate {
        &self.rehydration
    }

    /// Run every stage in order, each to completion before the next starts.
    pub async fn start(&self) -> TrustView {
        for stage in &self.stages {
            let status = stage.run().await;
            info!(stage = stage.name(), ?status, "startup stage finished");
        }
        self.view()
    }

    /// Retry every stage that is blocked or failed, in order.
    pub async fn retry(&self) -> TrustView {
        for stage in &self.stages {
            if matches!(
                stage.stage_status(),
                StageStatus::Blocked | StageStatus::Failed(_)
            ) {
                let status = stage.retry().await;
                debug!(stage = stage.name(), ?status, "stage retried");
            }
        }
        self.view()
    }

    pub fn view(&self) -> TrustView {
        let integrity = self.integrity.state();
        let rehydration = self.rehydration.status();

        let overlay = if integrity.is_blocking() {
            TrustOverlay::Tampered
        } else {
            match rehydration.overlay() {
                Overlay::Progress => TrustOverlay::Restoring,
                Overlay::Contentless => TrustOverlay::Loading,
                Overlay::RetryPrompt => TrustOverlay::RehydrationFailed {
                    message: match &rehydration {
                        RehydrationStatus::Error { message } => message.clone(),
                        _ => String::new(),
                    },
                },
                Overlay::None => TrustOverlay::None,
            }
        };

        TrustView {
            gameplay_released: rehydration.is_complete(),
            integrity,
            rehydration,
            overlay,
        }
    }

    /// Unmount every stage, last first.
    pub fn shutdown(&self) {
        for stage in self.stages.iter().rev() {
            stage.shutdown();
        }
    }
}

impl std::fmt::Debug for TrustPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustPipeline")
            .field("stages", &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}
