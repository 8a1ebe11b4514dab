use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::{AttemptRecord, PuzzleRecord, QueryWindow};
use crate::readiness::Readiness;
use crate::StorageResult;

/// Persistent key-value cache holding one JSON blob per key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;
    async fn set(&self, key: &str, value: String) -> StorageResult<()>;
    async fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Read and deserialize the JSON blob under `key`.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize `value` and store it under `key`.
pub async fn set_json<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, raw).await
}

/// Local relational store of puzzles and attempts.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Readiness signal resolved once migrations have run.
    fn readiness(&self) -> Readiness;

    /// Total attempts stored locally, across all users.
    async fn attempt_count(&self) -> StorageResult<u64>;

    async fn attempt_exists(&self, attempt_id: &str) -> StorageResult<bool>;

    /// Insert unless a row with the same id exists. Returns whether a row was written.
    async fn insert_attempt_if_absent(&self, attempt: &AttemptRecord) -> StorageResult<bool>;

    async fn get_attempt(&self, attempt_id: &str) -> StorageResult<Option<AttemptRecord>>;

    /// Attempts for one user, newest first.
    async fn list_attempts(
        &self,
        user_id: &str,
        window: QueryWindow,
    ) -> StorageResult<Vec<AttemptRecord>>;

    /// Attempts still queued for outbound sync.
    async fn pending_sync(&self) -> StorageResult<Vec<AttemptRecord>>;

    async fn puzzle_exists(&self, puzzle_id: &str) -> StorageResult<bool>;

    async fn upsert_puzzle(&self, puzzle: &PuzzleRecord) -> StorageResult<()>;

    async fn get_puzzle(&self, puzzle_id: &str) -> StorageResult<Option<PuzzleRecord>>;
}
