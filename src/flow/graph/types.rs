// SPDX-License-Identifier: MIT

//! Workflow definition types
//!
//! A `WorkflowDefinition` is an immutable, named list of steps. It is built
//! once, either through `WorkflowDefinition::builder()` or from a YAML file
//! (see `flow::builder`), and validated by `StepRegistry::build`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::flow::handler::StepHandler;
use crate::flow::state::StateSchema;

/// What role a step plays in the trigger graph
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Entry step, READY as soon as the run begins
    Start,
    /// Runs when its trigger condition is satisfied
    #[serde(alias = "listen")]
    Listener,
    /// Like a listener, but its output is also a dispatch label
    Router,
}

/// Firing rule for a consumer with one or more triggers
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    /// Exactly one producer; fires when it completes
    #[default]
    Single,
    /// Fires once every producer has completed
    And,
    /// Fires on the first producer to complete
    Or,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Single => write!(f, "SINGLE"),
            Condition::And => write!(f, "AND"),
            Condition::Or => write!(f, "OR"),
        }
    }
}

/// A named unit of work and its place in the trigger graph
#[derive(Clone)]
pub struct Step {
    pub name: String,
    pub kind: StepKind,
    /// Producer step names or router labels, in declaration order
    pub triggers: Vec<String>,
    pub condition: Condition,
    /// Labels a router may return (routers only)
    pub labels: Vec<String>,
    pub handler: Arc<dyn StepHandler>,
}

impl Step {
    pub fn start(name: impl Into<String>, handler: Arc<dyn StepHandler>) -> Self {
        Self {
            name: name.into(),
            kind: StepKind::Start,
            triggers: Vec::new(),
            condition: Condition::Single,
            labels: Vec::new(),
            handler,
        }
    }

    pub fn listener<I, S>(
        name: impl Into<String>,
        triggers: I,
        condition: Condition,
        handler: Arc<dyn StepHandler>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: StepKind::Listener,
            triggers: triggers.into_iter().map(Into::into).collect(),
            condition,
            labels: Vec::new(),
            handler,
        }
    }

    pub fn router<I, S, L, T>(
        name: impl Into<String>,
        triggers: I,
        condition: Condition,
        labels: L,
        handler: Arc<dyn StepHandler>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        L: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            kind: StepKind::Router,
            triggers: triggers.into_iter().map(Into::into).collect(),
            condition,
            labels: labels.into_iter().map(Into::into).collect(),
            handler,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("triggers", &self.triggers)
            .field("condition", &self.condition)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

/// An immutable, named collection of steps
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    name: String,
    description: String,
    steps: Vec<Step>,
    output_step: Option<String>,
    state_schema: StateSchema,
}

impl WorkflowDefinition {
    pub fn builder(name: impl Into<String>) -> WorkflowDefinitionBuilder {
        WorkflowDefinitionBuilder {
            definition: WorkflowDefinition {
                name: name.into(),
                description: String::new(),
                steps: Vec::new(),
                output_step: None,
                state_schema: StateSchema::default(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Steps in declaration order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Step whose output is the run's result, if designated
    pub fn output_step(&self) -> Option<&str> {
        self.output_step.as_deref()
    }

    pub fn state_schema(&self) -> &StateSchema {
        &self.state_schema
    }
}

/// Collects steps into a `WorkflowDefinition`
pub struct WorkflowDefinitionBuilder {
    definition: WorkflowDefinition,
}

impl WorkflowDefinitionBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = description.into();
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.definition.steps.push(step);
        self
    }

    pub fn start(self, name: impl Into<String>, handler: Arc<dyn StepHandler>) -> Self {
        self.step(Step::start(name, handler))
    }

    pub fn listen<I, S>(
        self,
        name: impl Into<String>,
        triggers: I,
        condition: Condition,
        handler: Arc<dyn StepHandler>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.step(Step::listener(name, triggers, condition, handler))
    }

    pub fn router<I, S, L, T>(
        self,
        name: impl Into<String>,
        triggers: I,
        condition: Condition,
        labels: L,
        handler: Arc<dyn StepHandler>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        L: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.step(Step::router(name, triggers, condition, labels, handler))
    }

    /// Designate the step whose output becomes the run's final result
    pub fn output(mut self, step: impl Into<String>) -> Self {
        self.definition.output_step = Some(step.into());
        self
    }

    pub fn state_schema(mut self, schema: StateSchema) -> Self {
        self.definition.state_schema = schema;
        self
    }

    pub fn build(self) -> WorkflowDefinition {
        self.definition
    }
}
