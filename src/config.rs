// SPDX-License-Identifier: MIT

//! Environment-driven engine configuration
//!
//! - `FLOWLINE_PERSISTENCE`: `none`, `memory` (default) or `sqlite`
//! - `FLOWLINE_DATABASE_URL`: SQLite URL, default `sqlite://flowline.db?mode=rwc`

use std::sync::Arc;

use crate::error::FlowError;
use crate::flow::persistence::{FlowPersistence, InMemoryPersistence, SqlitePersistence};

pub const PERSISTENCE_VAR: &str = "FLOWLINE_PERSISTENCE";
pub const DATABASE_URL_VAR: &str = "FLOWLINE_DATABASE_URL";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://flowline.db?mode=rwc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistenceKind {
    None,
    #[default]
    Memory,
    Sqlite,
}

impl std::str::FromStr for PersistenceKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(FlowError::config(format!(
                "{} must be one of none, memory, sqlite (got '{}')",
                PERSISTENCE_VAR, other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub persistence: PersistenceKind,
    pub database_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persistence: PersistenceKind::default(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

impl EngineConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, FlowError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FlowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let persistence = match lookup(PERSISTENCE_VAR) {
            Some(value) => value.parse()?,
            None => PersistenceKind::default(),
        };
        let database_url = lookup(DATABASE_URL_VAR)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        Ok(Self {
            persistence,
            database_url,
        })
    }

    /// Construct the configured snapshot backend
    pub async fn open_persistence(&self) -> Result<Option<Arc<dyn FlowPersistence>>, FlowError> {
        match self.persistence {
            PersistenceKind::None => Ok(None),
            PersistenceKind::Memory => {
                let store: Arc<dyn FlowPersistence> = Arc::new(InMemoryPersistence::new());
                Ok(Some(store))
            }
            PersistenceKind::Sqlite => {
                log::info!("Opening snapshot database at {}", self.database_url);
                let store: Arc<dyn FlowPersistence> =
                    Arc::new(SqlitePersistence::connect(&self.database_url).await?);
                Ok(Some(store))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.persistence, PersistenceKind::Memory);
    }

    #[test]
    fn test_sqlite_from_env() {
        let config = EngineConfig::from_lookup(lookup(&[
            (PERSISTENCE_VAR, "SQLite"),
            (DATABASE_URL_VAR, "sqlite::memory:"),
        ]))
        .unwrap();
        assert_eq!(config.persistence, PersistenceKind::Sqlite);
        assert_eq!(config.database_url, "sqlite::memory:");
    }

    #[test]
    fn test_invalid_persistence_kind() {
        let err = EngineConfig::from_lookup(lookup(&[(PERSISTENCE_VAR, "redis")])).unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn test_blank_database_url_uses_default() {
        let config = EngineConfig::from_lookup(lookup(&[(DATABASE_URL_VAR, "  ")])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
    }

    #[tokio::test]
    async fn test_open_persistence() {
        let none = EngineConfig {
            persistence: PersistenceKind::None,
            ..EngineConfig::default()
        };
        assert!(none.open_persistence().await.unwrap().is_none());

        let sqlite = EngineConfig {
            persistence: PersistenceKind::Sqlite,
            database_url: "sqlite::memory:".to_string(),
        };
        assert!(sqlite.open_persistence().await.unwrap().is_some());
    }
}
