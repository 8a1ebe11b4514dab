//! Daylock runtime.
//!
//! Gates that sit between app startup and gameplay:
//! - [`IntegrityGate`]: keeps the authorized date current and blocks the app
//!   while the device clock is tampered
//! - [`RehydrationGate`]: restores lost history before gameplay starts
//! - [`TrustPipeline`]: runs both in order and derives the overlay to show
//!
//! Plus configuration loading, tracing setup and app wiring for the
//! `daylock` binary.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod app;
pub mod config;
mod error;
pub mod integrity_gate;
pub mod lifecycle;
pub mod pipeline;
pub mod rehydration_gate;
pub mod telemetry;

pub use app::{HistoryEntry, HistoryReport, Services};
pub use config::{DaylockConfig, GateConfig, LoggingConfig, StorageConfig};
pub use error::{Result, RuntimeError};
pub use integrity_gate::{IntegrityGate, IntegrityState, IntegrityStatus};
pub use lifecycle::{AppLifecycle, AppState, LifecycleTransition};
pub use pipeline::{StageStatus, StartupStage, TrustOverlay, TrustPipeline, TrustView};
pub use rehydration_gate::{Overlay, RehydrationGate, RehydrationStatus};
pub use telemetry::init_tracing;
