// SPDX-License-Identifier: MIT

//! Snapshot persistence
//!
//! After every completed step the engine appends a `SnapshotRecord` holding
//! the run's state together with its ordered completed steps. The newest
//! record for an instance is its resume point.

mod memory;
mod sqlite;

pub use memory::InMemoryPersistence;
pub use sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PersistenceError;

/// A finished step and its output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub name: String,
    pub output: Value,
}

/// One append-only snapshot of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub instance_id: String,
    /// Step whose completion produced this snapshot
    pub step_name: String,
    pub timestamp: DateTime<Utc>,
    pub state: Value,
    /// Completed steps in completion order
    #[serde(default)]
    pub completed: Vec<CompletedStep>,
}

impl SnapshotRecord {
    pub fn new(
        instance_id: impl Into<String>,
        step_name: impl Into<String>,
        state: Value,
        completed: Vec<CompletedStep>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            step_name: step_name.into(),
            timestamp: Utc::now(),
            state,
            completed,
        }
    }
}

/// Storage backend for run snapshots
#[async_trait]
pub trait FlowPersistence: Send + Sync {
    /// Append a snapshot
    async fn save_snapshot(&self, record: &SnapshotRecord) -> Result<(), PersistenceError>;

    /// Most recent snapshot for an instance, if any
    async fn load_latest_snapshot(
        &self,
        instance_id: &str,
    ) -> Result<Option<SnapshotRecord>, PersistenceError>;

    /// Every snapshot for an instance, oldest first
    async fn list_snapshots(&self, instance_id: &str)
        -> Result<Vec<SnapshotRecord>, PersistenceError>;
}
