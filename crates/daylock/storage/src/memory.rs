//! In-memory reference implementations of the storage traits.
//!
//! Deterministic and test-friendly. Devices should use the file-backed
//! key-value store and the SQLite attempt store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::model::{apply_window, AttemptRecord, PuzzleRecord, QueryWindow, SyncState};
use crate::readiness::Readiness;
use crate::traits::{AttemptStore, KeyValueStore};
use crate::StorageResult;

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// In-memory attempt store.
#[derive(Debug)]
pub struct InMemoryAttemptStore {
    attempts: RwLock<HashMap<String, AttemptRecord>>,
    puzzles: RwLock<HashMap<String, PuzzleRecord>>,
    readiness: Readiness,
}

impl InMemoryAttemptStore {
    /// Store that is ready immediately.
    pub fn new() -> Self {
        Self::with_readiness(Readiness::ready())
    }

    /// Store whose readiness is resolved by the caller, to simulate a slow
    /// migration at startup.
    pub fn with_readiness(readiness: Readiness) -> Self {
        Self {
            attempts: RwLock::new(HashMap::new()),
            puzzles: RwLock::new(HashMap::new()),
            readiness,
        }
    }

    pub fn puzzle_count(&self) -> usize {
        self.puzzles.read().len()
    }
}

impl Default for InMemoryAttemptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    async fn attempt_count(&self) -> StorageResult<u64> {
        Ok(self.attempts.read().len() as u64)
    }

    async fn attempt_exists(&self, attempt_id: &str) -> StorageResult<bool> {
        Ok(self.attempts.read().contains_key(attempt_id))
    }

    async fn insert_attempt_if_absent(&self, attempt: &AttemptRecord) -> StorageResult<bool> {
        let mut guard = self.attempts.write();
        if guard.contains_key(&attempt.id) {
            return Ok(false);
        }
        guard.insert(attempt.id.clone(), attempt.clone());
        Ok(true)
    }

    async fn get_attempt(&self, attempt_id: &str) -> StorageResult<Option<AttemptRecord>> {
        Ok(self.attempts.read().get(attempt_id).cloned())
    }

    async fn list_attempts(
        &self,
        user_id: &str,
        window: QueryWindow,
    ) -> StorageResult<Vec<AttemptRecord>> {
        let mut values = self
            .attempts
            .read()
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(apply_window(values, window))
    }

    async fn pending_sync(&self) -> StorageResult<Vec<AttemptRecord>> {
        let mut values = self
            .attempts
            .read()
            .values()
            .filter(|a| a.sync_state == SyncState::Pending)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(values)
    }

    async fn puzzle_exists(&self, puzzle_id: &str) -> StorageResult<bool> {
        Ok(self.puzzles.read().contains_key(puzzle_id))
    }

    async fn upsert_puzzle(&self, puzzle: &PuzzleRecord) -> StorageResult<()> {
        self.puzzles
            .write()
            .insert(puzzle.id.clone(), puzzle.clone());
        Ok(())
    }

    async fn get_puzzle(&self, puzzle_id: &str) -> StorageResult<Option<PuzzleRecord>> {
        Ok(self.puzzles.read().get(puzzle_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{get_json, set_json};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn attempt(id: &str, minute: u32, sync_state: SyncState) -> AttemptRecord {
        AttemptRecord {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            puzzle_id: "puzzle-1".to_string(),
            puzzle_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            completed: true,
            score: Some(100),
            time_taken_secs: Some(42),
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap(),
            sync_state,
        }
    }

    #[tokio::test]
    async fn insert_if_absent_never_duplicates() {
        let store = InMemoryAttemptStore::new();
        let a = attempt("a-1", 0, SyncState::Synced);

        assert!(store.insert_attempt_if_absent(&a).await.unwrap());
        assert!(!store.insert_attempt_if_absent(&a).await.unwrap());
        assert_eq!(store.attempt_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn pending_sync_excludes_synced_rows() {
        let store = InMemoryAttemptStore::new();
        store
            .insert_attempt_if_absent(&attempt("local", 1, SyncState::Pending))
            .await
            .unwrap();
        store
            .insert_attempt_if_absent(&attempt("restored", 2, SyncState::Synced))
            .await
            .unwrap();

        let pending = store.pending_sync().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "local");
    }

    #[tokio::test]
    async fn list_attempts_newest_first() {
        let store = InMemoryAttemptStore::new();
        for (id, minute) in [("old", 1), ("new", 30), ("mid", 10)] {
            store
                .insert_attempt_if_absent(&attempt(id, minute, SyncState::Synced))
                .await
                .unwrap();
        }

        let listed = store
            .list_attempts("user-1", QueryWindow::first(2))
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn json_helpers_round_trip_through_kv() {
        let store = InMemoryKeyValueStore::new();
        set_json(&store, "k", &vec![1, 2, 3]).await.unwrap();

        let loaded: Option<Vec<u32>> = get_json(&store, "k").await.unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));

        store.remove("k").await.unwrap();
        let missing: Option<Vec<u32>> = get_json(&store, "k").await.unwrap();
        assert!(missing.is_none());
    }
}
