// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{FlowPersistence, SnapshotRecord};
use crate::error::PersistenceError;

/// Process-local snapshot store.
///
/// Clones share the same underlying records.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    records: Arc<RwLock<Vec<SnapshotRecord>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored snapshots across all instances
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl FlowPersistence for InMemoryPersistence {
    async fn save_snapshot(&self, record: &SnapshotRecord) -> Result<(), PersistenceError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn load_latest_snapshot(
        &self,
        instance_id: &str,
    ) -> Result<Option<SnapshotRecord>, PersistenceError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .find(|r| r.instance_id == instance_id)
            .cloned())
    }

    async fn list_snapshots(
        &self,
        instance_id: &str,
    ) -> Result<Vec<SnapshotRecord>, PersistenceError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.instance_id == instance_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_then_load_latest() {
        let store = InMemoryPersistence::new();
        let state = json!({"phase": "planning", "risks": ["scope"]});
        store
            .save_snapshot(&SnapshotRecord::new("run-1", "s1", state.clone(), vec![]))
            .await
            .unwrap();

        let loaded = store.load_latest_snapshot("run-1").await.unwrap().unwrap();
        assert_eq!(loaded.state, state);
        assert_eq!(loaded.step_name, "s1");
    }

    #[tokio::test]
    async fn test_latest_is_newest_for_instance() {
        let store = InMemoryPersistence::new();
        store
            .save_snapshot(&SnapshotRecord::new("run-1", "a", json!({"n": 1}), vec![]))
            .await
            .unwrap();
        store
            .save_snapshot(&SnapshotRecord::new("run-2", "a", json!({"n": 9}), vec![]))
            .await
            .unwrap();
        store
            .save_snapshot(&SnapshotRecord::new("run-1", "b", json!({"n": 2}), vec![]))
            .await
            .unwrap();

        let latest = store.load_latest_snapshot("run-1").await.unwrap().unwrap();
        assert_eq!(latest.step_name, "b");
        assert_eq!(store.list_snapshots("run-1").await.unwrap().len(), 2);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_missing_instance() {
        let store = InMemoryPersistence::new();
        assert!(store.load_latest_snapshot("nope").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }
}
