//! Daylock time integrity.
//!
//! [`TimeAuthority`] answers "what day is it" without trusting the device
//! clock. It compares the device clock against remote sources, classifies
//! each check as `verified`, `offline` or `tampered`, persists a
//! [`TimeCache`] snapshot for offline rollback detection, and re-checks at
//! every local midnight.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod authority;
mod cache;
pub mod config;
mod error;
pub mod mock;
mod model;
pub mod source;

pub use authority::TimeAuthority;
pub use cache::TimeCacheStore;
pub use config::{TamperReportCadence, TimeConfig};
pub use error::{Result, TimeError};
pub use model::{TimeCache, TimeCheckResult, TimeSourceKind, TimeStatus};
pub use source::{build_http_client, BackendTimeSource, TimeSource, WorldTimeSource};
