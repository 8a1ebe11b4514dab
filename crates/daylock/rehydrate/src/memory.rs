//! In-memory remote history for tests and offline demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use daylock_storage::{AttemptRecord, PuzzleRecord};
use parking_lot::RwLock;

use crate::error::{RehydrationError, Result};
use crate::remote::RemoteHistory;

/// Which remote call to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCall {
    Count,
    Attempts,
    Puzzles,
}

#[derive(Default)]
struct Data {
    attempts: Vec<AttemptRecord>,
    puzzles: HashMap<String, PuzzleRecord>,
}

/// Backend history held in memory, with per-call failure injection.
#[derive(Default)]
pub struct InMemoryRemoteHistory {
    data: RwLock<Data>,
    failing: RwLock<Vec<RemoteCall>>,
    calls: RwLock<HashMap<RemoteCall, usize>>,
    total_calls: AtomicUsize,
}

impl InMemoryRemoteHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_attempt(&self, attempt: AttemptRecord) {
        self.data.write().attempts.push(attempt);
    }

    pub fn add_puzzle(&self, puzzle: PuzzleRecord) {
        self.data.write().puzzles.insert(puzzle.id.clone(), puzzle);
    }

    /// Make every subsequent `call` fail until [`Self::recover`].
    pub fn fail(&self, call: RemoteCall) {
        self.failing.write().push(call);
    }

    pub fn recover(&self) {
        self.failing.write().clear();
    }

    pub fn calls(&self, call: RemoteCall) -> usize {
        self.calls.read().get(&call).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn enter(&self, call: RemoteCall) -> Result<()> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self.calls.write().entry(call).or_default() += 1;
        if self.failing.read().contains(&call) {
            return Err(RehydrationError::Remote(format!(
                "injected {call:?} failure"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteHistory for InMemoryRemoteHistory {
    async fn count_attempts_since(&self, user_id: &str, since: NaiveDate) -> Result<u64> {
        self.enter(RemoteCall::Count)?;
        let count = self
            .data
            .read()
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.puzzle_date >= since)
            .count();
        Ok(count as u64)
    }

    async fn fetch_recent_attempts(
        &self,
        user_id: &str,
        since: NaiveDate,
        limit: usize,
    ) -> Result<Vec<AttemptRecord>> {
        self.enter(RemoteCall::Attempts)?;
        let mut attempts: Vec<AttemptRecord> = self
            .data
            .read()
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.puzzle_date >= since)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| {
            b.puzzle_date
                .cmp(&a.puzzle_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        attempts.truncate(limit);
        Ok(attempts)
    }

    async fn fetch_puzzles(&self, puzzle_ids: &[String]) -> Result<Vec<PuzzleRecord>> {
        self.enter(RemoteCall::Puzzles)?;
        let data = self.data.read();
        Ok(puzzle_ids
            .iter()
            .filter_map(|id| data.puzzles.get(id).cloned())
            .collect())
    }
}
