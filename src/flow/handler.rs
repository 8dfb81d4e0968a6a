// SPDX-License-Identifier: MIT

//! Units of work
//!
//! Every step is backed by a `StepHandler`. The engine calls it with the
//! run's shared state and the outputs of whichever producers satisfied the
//! step's trigger condition.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::BoxError;
use crate::flow::graph::Flow;
use crate::flow::state::WorkflowState;

/// Outputs of the producers that triggered a step, in trigger order.
///
/// For a trigger naming a router label, the entry is keyed by the label and
/// holds the router's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInputs {
    outputs: Vec<(String, Value)>,
}

impl StepInputs {
    pub fn new(outputs: Vec<(String, Value)>) -> Self {
        Self { outputs }
    }

    /// Output of a specific producer (or label)
    pub fn get(&self, producer: &str) -> Option<&Value> {
        self.outputs
            .iter()
            .find(|(name, _)| name == producer)
            .map(|(_, value)| value)
    }

    /// The first available producer output
    pub fn first(&self) -> Option<&Value> {
        self.outputs.first().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.outputs.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn producers(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Trait for the unit of work behind a step.
///
/// The returned value is the step's output. For router steps it is also the
/// dispatch label when it is a JSON string.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn run(&self, state: &mut WorkflowState, inputs: &StepInputs) -> Result<Value, BoxError>;
}

/// Adapter turning a synchronous closure into a `StepHandler`
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F> StepHandler for FnHandler<F>
where
    F: Fn(&mut WorkflowState, &StepInputs) -> Result<Value, BoxError> + Send + Sync,
{
    async fn run(&self, state: &mut WorkflowState, inputs: &StepInputs) -> Result<Value, BoxError> {
        (self.f)(state, inputs)
    }
}

/// Wrap a closure as a step handler
pub fn handler_fn<F>(f: F) -> Arc<dyn StepHandler>
where
    F: Fn(&mut WorkflowState, &StepInputs) -> Result<Value, BoxError> + Send + Sync + 'static,
{
    Arc::new(FnHandler { f })
}

/// Runs a nested flow as a single step.
///
/// The nested run starts from a copy of the parent's state; when it finishes
/// its final state replaces the parent's and its output becomes this step's
/// output. The parent's dispatch loop waits for the nested run to finish.
pub struct SubflowHandler {
    flow: Arc<Flow>,
}

impl SubflowHandler {
    pub fn new(flow: Arc<Flow>) -> Self {
        Self { flow }
    }
}

#[async_trait]
impl StepHandler for SubflowHandler {
    async fn run(&self, state: &mut WorkflowState, _inputs: &StepInputs) -> Result<Value, BoxError> {
        log::info!("Delegating to nested flow '{}'", self.flow.name());
        let result = self.flow.kickoff(Some(state.clone())).await?;
        *state = result.state;
        Ok(result.output)
    }
}

/// Placeholder for steps that are described but not bound to code.
///
/// Used when a YAML definition is loaded only for inspection or rendering.
pub(crate) struct UnboundHandler {
    pub(crate) step: String,
}

#[async_trait]
impl StepHandler for UnboundHandler {
    async fn run(&self, _state: &mut WorkflowState, _inputs: &StepInputs) -> Result<Value, BoxError> {
        Err(format!("step '{}' has no handler bound", self.step).into())
    }
}
