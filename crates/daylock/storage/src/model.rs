use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Outbound sync state of a locally stored attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Written locally, waiting to be pushed to the backend.
    Pending,
    /// Known to the backend already; never re-enters the outbound queue.
    Synced,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(SyncState::Pending),
            "synced" => Some(SyncState::Synced),
            _ => None,
        }
    }
}

/// One play-through of a daily puzzle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    /// Backend-assigned identity; the upsert key.
    pub id: String,
    pub user_id: String,
    pub puzzle_id: String,
    pub puzzle_date: NaiveDate,
    pub completed: bool,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub time_taken_secs: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_sync_state")]
    pub sync_state: SyncState,
}

fn default_sync_state() -> SyncState {
    SyncState::Synced
}

impl AttemptRecord {
    /// Copy of this attempt flagged as already known to the backend.
    pub fn into_synced(mut self) -> Self {
        self.sync_state = SyncState::Synced;
        self
    }
}

/// Daily puzzle content an attempt belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleRecord {
    pub id: String,
    pub puzzle_date: NaiveDate,
    pub game_type: String,
    pub content: serde_json::Value,
}

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn first(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }
}

pub(crate) fn apply_window<T>(values: Vec<T>, window: QueryWindow) -> Vec<T> {
    let limit = if window.limit == 0 {
        usize::MAX
    } else {
        window.limit
    };
    values.into_iter().skip(window.offset).take(limit).collect()
}
