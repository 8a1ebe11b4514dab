//! Daylock data rehydration.
//!
//! After a reinstall the local attempt store is empty while the backend
//! still holds the user's history. [`RehydrationProbe`] detects that case
//! without side effects; [`RehydrationPipeline`] restores a bounded window
//! of history, and [`RehydrationFlagStore`] records completion per install
//! so later launches skip the probe.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod config;
mod error;
pub mod flag;
pub mod memory;
mod pipeline;
mod probe;
pub mod remote;

pub use config::RehydrationConfig;
pub use error::{RehydrationError, Result};
pub use flag::{InstallId, RehydrationFlag, RehydrationFlagStore};
pub use memory::{InMemoryRemoteHistory, RemoteCall};
pub use pipeline::{RehydrationPipeline, RehydrationResult};
pub use probe::{ProbeOutcome, RehydrationProbe};
pub use remote::{HttpRemoteHistory, RemoteHistory};
