//! Daylock local persistence.
//!
//! Two storage contracts back the trust layer:
//! - [`KeyValueStore`]: small JSON blobs (time cache, rehydration flags, install id)
//! - [`AttemptStore`]: puzzle and attempt tables plus a [`Readiness`] signal
//!
//! In-memory adapters are provided for tests; devices use
//! [`FileKeyValueStore`] and, with the `sqlite` feature, `SqliteAttemptStore`.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod file;
pub mod memory;
mod model;
mod readiness;
#[cfg(feature = "sqlite")]
pub mod sqlite;
mod traits;

pub use error::{StorageError, StorageResult};
pub use file::FileKeyValueStore;
pub use memory::{InMemoryAttemptStore, InMemoryKeyValueStore};
pub use model::{AttemptRecord, PuzzleRecord, QueryWindow, SyncState};
pub use readiness::Readiness;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAttemptStore;
pub use traits::{get_json, set_json, AttemptStore, KeyValueStore};
