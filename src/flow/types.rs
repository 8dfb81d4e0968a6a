// SPDX-License-Identifier: MIT

//! YAML schema types for declarative flow definitions
//!
//! ```yaml
//! name: project_initiation
//! output: charter
//! steps:
//!   - name: gather
//!     kind: start
//!   - name: charter
//!     kind: listen
//!     triggers: gather
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::flow::graph::{Condition, StepKind};
use crate::flow::state::StateSchema;

/// Top-level flow file
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct FlowFile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Step whose output is the run's result
    pub output: Option<String>,
    /// Optional state schema (defaults and reducers)
    pub state: Option<StateSchema>,
    pub steps: Vec<StepDef>,
}

/// One step entry
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct StepDef {
    pub name: String,
    pub kind: StepKind,
    #[serde(default)]
    pub triggers: Triggers,
    /// Defaults to `single` for one trigger and `and` for several
    pub condition: Option<Condition>,
    /// Labels a router may return
    #[serde(default)]
    pub labels: Vec<String>,
    /// Registered handler name; defaults to the step name
    pub handler: Option<String>,
}

impl StepDef {
    pub fn handler_name(&self) -> &str {
        self.handler.as_deref().unwrap_or(&self.name)
    }

    pub fn resolved_condition(&self) -> Condition {
        match self.condition {
            Some(condition) => condition,
            None if self.triggers.len() > 1 => Condition::And,
            None => Condition::Single,
        }
    }
}

/// Trigger list (single string or array)
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema)]
#[serde(untagged)]
pub enum Triggers {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl Triggers {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Triggers::None => vec![],
            Triggers::Single(s) => vec![s.clone()],
            Triggers::Multiple(v) => v.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Triggers::None => 0,
            Triggers::Single(_) => 1,
            Triggers::Multiple(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
