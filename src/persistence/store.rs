//! SQLite-based state store

use crate::core::{BatchProgress, PipelineState, Position, StorageError};
use crate::persistence::{StateMetadata, StateStore, DEFAULT_LOCK_TIMEOUT_SECS};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS pipeline_state (
        pipeline_id TEXT PRIMARY KEY,
        position INTEGER NOT NULL,
        owner TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS batch_progress (
        pipeline_id TEXT PRIMARY KEY,
        total_iterations INTEGER NOT NULL DEFAULT 1,
        current_iteration INTEGER NOT NULL DEFAULT 0,
        completed INTEGER NOT NULL DEFAULT 0,
        status_message TEXT NOT NULL DEFAULT '',
        data TEXT NOT NULL DEFAULT 'null'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS run_data (
        pipeline_id TEXT PRIMARY KEY,
        data TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pipeline_locks (
        pipeline_id TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        acquired_at INTEGER NOT NULL
    )
    "#,
];

/// SQLite state store
pub struct SqliteStateStore {
    pool: SqlitePool,
    lock_timeout: Duration,
}

impl SqliteStateStore {
    /// Open (or create) the database at `db_path`
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database, lost when the store is dropped
    pub async fn in_memory() -> Result<Self> {
        // A single, never-recycled connection: every connection to
        // `:memory:` would otherwise see its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self {
            pool,
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
        };
        store.init().await?;
        Ok(store)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize schema")?;
        }
        Ok(())
    }

    /// Read an iteration counter, refusing values that do not fit a `u32`
    fn iteration_count(row: &SqliteRow, column: &str) -> Result<u32, StorageError> {
        let raw: i64 = row.try_get(column)?;
        u32::try_from(raw).map_err(|_| {
            StorageError::Backend(format!("stored {} out of range: {}", column, raw))
        })
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn is_persisted(&self, pipeline_id: &str) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM pipeline_state WHERE pipeline_id = ?1")
            .bind(pipeline_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn get_state(&self, pipeline_id: &str) -> Result<Option<PipelineState>, StorageError> {
        let row = sqlx::query("SELECT position FROM pipeline_state WHERE pipeline_id = ?1")
            .bind(pipeline_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| {
            PipelineState::new(pipeline_id, Position::from_index(row.get::<i64, _>("position")))
        }))
    }

    async fn set_state(&self, state: &PipelineState, owner: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO pipeline_state (pipeline_id, position, owner, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(state.pipeline_id())
        .bind(state.position().to_index())
        .bind(owner)
        .bind(Self::to_naive(Utc::now()))
        .execute(&self.pool)
        .await?;

        debug!(
            "Stored state for {} at position {}",
            state.pipeline_id(),
            state.position()
        );
        Ok(())
    }

    async fn get_batch_progress(&self, pipeline_id: &str) -> Result<BatchProgress, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT total_iterations, current_iteration, completed, status_message, data
            FROM batch_progress
            WHERE pipeline_id = ?1
            "#,
        )
        .bind(pipeline_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let data: Value = serde_json::from_str(&row.get::<String, _>("data"))?;
                Ok(BatchProgress::restore(
                    Self::iteration_count(&row, "total_iterations")?,
                    Self::iteration_count(&row, "current_iteration")?,
                    row.get::<i64, _>("completed") != 0,
                    row.get("status_message"),
                    data,
                ))
            }
            None => Ok(BatchProgress::new()),
        }
    }

    async fn set_batch_progress(
        &self,
        pipeline_id: &str,
        progress: &BatchProgress,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO batch_progress
            (pipeline_id, total_iterations, current_iteration, completed, status_message, data)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(pipeline_id)
        .bind(progress.total_batch_iterations() as i64)
        .bind(progress.batch_iteration() as i64)
        .bind(progress.completed() as i64)
        .bind(progress.status_message())
        .bind(serde_json::to_string(progress.data())?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reset_batch_progress(&self, pipeline_id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM batch_progress WHERE pipeline_id = ?1")
            .bind(pipeline_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_run_data(&self, pipeline_id: &str) -> Result<Map<String, Value>, StorageError> {
        let row = sqlx::query("SELECT data FROM run_data WHERE pipeline_id = ?1")
            .bind(pipeline_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(serde_json::from_str(&row.get::<String, _>("data"))?),
            None => Ok(Map::new()),
        }
    }

    async fn set_run_data(
        &self,
        pipeline_id: &str,
        data: &Map<String, Value>,
    ) -> Result<(), StorageError> {
        sqlx::query("INSERT OR REPLACE INTO run_data (pipeline_id, data) VALUES (?1, ?2)")
            .bind(pipeline_id)
            .bind(serde_json::to_string(data)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset(&self, pipeline_id: &str) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for table in ["pipeline_state", "batch_progress", "run_data"] {
            sqlx::query(&format!("DELETE FROM {} WHERE pipeline_id = ?1", table))
                .bind(pipeline_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("Cleared stored state for {}", pipeline_id);
        Ok(())
    }

    async fn state_metadata(
        &self,
        pipeline_id: &str,
    ) -> Result<Option<StateMetadata>, StorageError> {
        let row = sqlx::query("SELECT owner, updated_at FROM pipeline_state WHERE pipeline_id = ?1")
            .bind(pipeline_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| StateMetadata {
            owner: row.get("owner"),
            updated_at: Self::from_naive(row.get("updated_at")),
        }))
    }

    async fn acquire_lock(&self, pipeline_id: &str, owner: &str) -> Result<(), StorageError> {
        let now = Utc::now().timestamp_millis();
        let stale_before = now - self.lock_timeout.as_millis() as i64;

        // Single statement so two processes cannot both win
        let result = sqlx::query(
            r#"
            INSERT INTO pipeline_locks (pipeline_id, owner, acquired_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(pipeline_id) DO UPDATE
            SET owner = excluded.owner, acquired_at = excluded.acquired_at
            WHERE pipeline_locks.owner = excluded.owner OR pipeline_locks.acquired_at <= ?4
            "#,
        )
        .bind(pipeline_id)
        .bind(owner)
        .bind(now)
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let holder: Option<String> =
            sqlx::query_scalar("SELECT owner FROM pipeline_locks WHERE pipeline_id = ?1")
                .bind(pipeline_id)
                .fetch_optional(&self.pool)
                .await?;

        Err(StorageError::Locked {
            pipeline_id: pipeline_id.to_string(),
            owner: holder.unwrap_or_default(),
        })
    }

    async fn release_lock(&self, pipeline_id: &str, owner: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM pipeline_locks WHERE pipeline_id = ?1 AND owner = ?2")
            .bind(pipeline_id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
