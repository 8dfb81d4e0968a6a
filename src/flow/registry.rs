// SPDX-License-Identifier: MIT

//! Named step handlers for declaratively defined flows.
//!
//! YAML definitions refer to units of work by name; the application registers
//! the code behind each name here before building the flow.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::flow::handler::StepHandler;

#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn StepHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, name: impl Into<String>, handler: Arc<dyn StepHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.insert(name.into(), handler);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn StepHandler>> {
        let handlers = self.handlers.read().await;
        handlers.get(name).cloned()
    }

    /// Registered handler names, sorted
    pub async fn names(&self) -> Vec<String> {
        let handlers = self.handlers.read().await;
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
