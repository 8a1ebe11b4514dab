//! SQLite adapter for the local attempt store.
//!
//! The store is not ready until the schema has been created; the readiness
//! signal is resolved at the end of [`SqliteAttemptStore::from_pool`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::info;

use crate::model::{AttemptRecord, PuzzleRecord, QueryWindow, SyncState};
use crate::readiness::Readiness;
use crate::traits::AttemptStore;
use crate::{StorageError, StorageResult};

/// SQLite-backed attempt store.
#[derive(Debug, Clone)]
pub struct SqliteAttemptStore {
    pool: SqlitePool,
    readiness: Readiness,
}

impl SqliteAttemptStore {
    /// Connect (creating the database file if missing) and initialize schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 4).await
    }

    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
    ) -> StorageResult<Self> {
        let url = if database_url.contains('?') || database_url.contains(":memory:") {
            database_url.to_string()
        } else {
            format!("{database_url}?mode=rwc")
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to open sqlite: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> StorageResult<Self> {
        let store = Self {
            pool,
            readiness: Readiness::pending(),
        };
        store.init_schema().await?;
        store.readiness.mark_ready();
        info!("local attempt store ready");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS puzzles (
                id TEXT PRIMARY KEY,
                puzzle_date TEXT NOT NULL,
                game_type TEXT NOT NULL,
                content TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS attempts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                puzzle_id TEXT NOT NULL,
                puzzle_date TEXT NOT NULL,
                completed INTEGER NOT NULL,
                score INTEGER,
                time_taken_secs INTEGER,
                created_at TEXT NOT NULL,
                sync_state TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS attempts_user_created ON attempts (user_id, created_at)",
            "CREATE INDEX IF NOT EXISTS attempts_sync_state ON attempts (sync_state)",
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn parse_date(raw: &str) -> StorageResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| StorageError::Serialization(format!("bad date {raw:?}: {e}")))
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp {raw:?}: {e}")))
}

fn attempt_from_row(row: &SqliteRow) -> StorageResult<AttemptRecord> {
    let puzzle_date: String = row.try_get("puzzle_date").map_err(backend)?;
    let created_at: String = row.try_get("created_at").map_err(backend)?;
    let sync_state: String = row.try_get("sync_state").map_err(backend)?;
    let time_taken: Option<i64> = row.try_get("time_taken_secs").map_err(backend)?;

    Ok(AttemptRecord {
        id: row.try_get("id").map_err(backend)?,
        user_id: row.try_get("user_id").map_err(backend)?,
        puzzle_id: row.try_get("puzzle_id").map_err(backend)?,
        puzzle_date: parse_date(&puzzle_date)?,
        completed: row.try_get("completed").map_err(backend)?,
        score: row.try_get("score").map_err(backend)?,
        time_taken_secs: time_taken.and_then(|v| u32::try_from(v).ok()),
        created_at: parse_timestamp(&created_at)?,
        sync_state: SyncState::parse(&sync_state).ok_or_else(|| {
            StorageError::Serialization(format!("unknown sync state {sync_state:?}"))
        })?,
    })
}

fn puzzle_from_row(row: &SqliteRow) -> StorageResult<PuzzleRecord> {
    let puzzle_date: String = row.try_get("puzzle_date").map_err(backend)?;
    let content: String = row.try_get("content").map_err(backend)?;

    Ok(PuzzleRecord {
        id: row.try_get("id").map_err(backend)?,
        puzzle_date: parse_date(&puzzle_date)?,
        game_type: row.try_get("game_type").map_err(backend)?,
        content: serde_json::from_str(&content)?,
    })
}

const ATTEMPT_COLUMNS: &str = "id, user_id, puzzle_id, puzzle_date, completed, score, \
                               time_taken_secs, created_at, sync_state";

#[async_trait]
impl AttemptStore for SqliteAttemptStore {
    fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    async fn attempt_count(&self) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attempts")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count.max(0) as u64)
    }

    async fn attempt_exists(&self, attempt_id: &str) -> StorageResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM attempts WHERE id = ?1")
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(found.is_some())
    }

    async fn insert_attempt_if_absent(&self, attempt: &AttemptRecord) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO attempts (
                id, user_id, puzzle_id, puzzle_date, completed, score,
                time_taken_secs, created_at, sync_state
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&attempt.id)
        .bind(&attempt.user_id)
        .bind(&attempt.puzzle_id)
        .bind(attempt.puzzle_date.format("%Y-%m-%d").to_string())
        .bind(attempt.completed)
        .bind(attempt.score)
        .bind(attempt.time_taken_secs.map(i64::from))
        .bind(attempt.created_at.to_rfc3339())
        .bind(attempt.sync_state.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_attempt(&self, attempt_id: &str) -> StorageResult<Option<AttemptRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1"
        ))
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(attempt_from_row).transpose()
    }

    async fn list_attempts(
        &self,
        user_id: &str,
        window: QueryWindow,
    ) -> StorageResult<Vec<AttemptRecord>> {
        let limit = if window.limit == 0 {
            -1
        } else {
            window.limit as i64
        };
        let rows = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE user_id = ?1 \
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(window.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(attempt_from_row).collect()
    }

    async fn pending_sync(&self) -> StorageResult<Vec<AttemptRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE sync_state = ?1 ORDER BY created_at ASC"
        ))
        .bind(SyncState::Pending.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(attempt_from_row).collect()
    }

    async fn puzzle_exists(&self, puzzle_id: &str) -> StorageResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM puzzles WHERE id = ?1")
            .bind(puzzle_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(found.is_some())
    }

    async fn upsert_puzzle(&self, puzzle: &PuzzleRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO puzzles (id, puzzle_date, game_type, content)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (id) DO UPDATE SET
                puzzle_date = excluded.puzzle_date,
                game_type = excluded.game_type,
                content = excluded.content
            "#,
        )
        .bind(&puzzle.id)
        .bind(puzzle.puzzle_date.format("%Y-%m-%d").to_string())
        .bind(&puzzle.game_type)
        .bind(serde_json::to_string(&puzzle.content)?)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_puzzle(&self, puzzle_id: &str) -> StorageResult<Option<PuzzleRecord>> {
        let row = sqlx::query("SELECT id, puzzle_date, game_type, content FROM puzzles WHERE id = ?1")
            .bind(puzzle_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(puzzle_from_row).transpose()
    }
}
