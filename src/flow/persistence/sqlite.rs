// SPDX-License-Identifier: MIT

//! SQLite snapshot store
//!
//! One row per snapshot in `flow_snapshots`; state and completed steps are
//! stored as JSON text. Rows are never updated, and the highest row id for an
//! instance is its latest snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

use super::{CompletedStep, FlowPersistence, SnapshotRecord};
use crate::error::PersistenceError;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS flow_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_id TEXT NOT NULL,
    step_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    state TEXT NOT NULL,
    completed TEXT NOT NULL DEFAULT '[]'
)";

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_flow_snapshots_instance ON flow_snapshots (instance_id, id)";

#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Open (creating if needed) the database at `database_url`.
    ///
    /// Uses a single connection so writes are serialized and `sqlite::memory:`
    /// databases survive for the lifetime of the store.
    pub async fn connect(database_url: &str) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Use an existing pool, creating the snapshot table if missing
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, PersistenceError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_INDEX).execute(&pool).await?;
        log::debug!("Snapshot table ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn record_from_row(row: &SqliteRow) -> Result<SnapshotRecord, PersistenceError> {
    let created_at: String = row.try_get("created_at")?;
    let state: String = row.try_get("state")?;
    let completed: String = row.try_get("completed")?;

    Ok(SnapshotRecord {
        instance_id: row.try_get("instance_id")?,
        step_name: row.try_get("step_name")?,
        timestamp: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
        state: serde_json::from_str(&state)?,
        completed: serde_json::from_str::<Vec<CompletedStep>>(&completed)?,
    })
}

#[async_trait]
impl FlowPersistence for SqlitePersistence {
    async fn save_snapshot(&self, record: &SnapshotRecord) -> Result<(), PersistenceError> {
        let state = serde_json::to_string(&record.state)?;
        let completed = serde_json::to_string(&record.completed)?;

        sqlx::query(
            "INSERT INTO flow_snapshots (instance_id, step_name, created_at, state, completed)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.instance_id)
        .bind(&record.step_name)
        .bind(record.timestamp.to_rfc3339())
        .bind(state)
        .bind(completed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_latest_snapshot(
        &self,
        instance_id: &str,
    ) -> Result<Option<SnapshotRecord>, PersistenceError> {
        let row = sqlx::query(
            "SELECT instance_id, step_name, created_at, state, completed
             FROM flow_snapshots WHERE instance_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_snapshots(
        &self,
        instance_id: &str,
    ) -> Result<Vec<SnapshotRecord>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT instance_id, step_name, created_at, state, completed
             FROM flow_snapshots WHERE instance_id = ? ORDER BY id ASC",
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}
