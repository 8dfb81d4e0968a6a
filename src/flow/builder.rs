// SPDX-License-Identifier: MIT

//! Flow builder - turns declarative flow files into executable flows
//!
//! Each step in a `FlowFile` is bound to the handler registered under its
//! handler name, then the assembled definition goes through the same
//! validation as programmatically built definitions.

use std::sync::Arc;

use crate::error::{DefinitionError, FlowError};
use crate::flow::graph::{Flow, Step, StepRegistry, WorkflowDefinition};
use crate::flow::handler::{StepHandler, UnboundHandler};
use crate::flow::loader::FlowLoader;
use crate::flow::persistence::FlowPersistence;
use crate::flow::registry::HandlerRegistry;
use crate::flow::types::{FlowFile, StepDef};

pub struct Builder {
    loader: FlowLoader,
    handlers: HandlerRegistry,
    persistence: Option<Arc<dyn FlowPersistence>>,
}

impl Builder {
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self {
            loader: FlowLoader::new(),
            handlers,
            persistence: None,
        }
    }

    /// Attach a snapshot backend to every flow this builder produces
    pub fn with_persistence(mut self, persistence: Option<Arc<dyn FlowPersistence>>) -> Self {
        self.persistence = persistence;
        self
    }

    /// Build a flow from a YAML file path
    pub async fn build_flow(&self, file_path: &str) -> Result<Flow, FlowError> {
        let file = self.loader.load_flow(file_path)?;
        self.build_from_file(&file).await
    }

    /// Build a flow from a parsed flow file
    pub async fn build_from_file(&self, file: &FlowFile) -> Result<Flow, FlowError> {
        let mut steps = Vec::with_capacity(file.steps.len());
        for step_def in &file.steps {
            let handler_name = step_def.handler_name();
            let handler = self.handlers.get(handler_name).await.ok_or_else(|| {
                DefinitionError::MissingHandler {
                    step: step_def.name.clone(),
                    handler: handler_name.to_string(),
                }
            })?;
            steps.push(to_step(step_def, handler));
        }

        let registry = StepRegistry::build(assemble(file, steps))?;
        log::info!(
            "Built flow '{}' with {} steps",
            registry.name(),
            registry.steps().len()
        );

        let flow = Flow::from_registry(registry);
        Ok(match &self.persistence {
            Some(persistence) => flow.with_persistence(persistence.clone()),
            None => flow,
        })
    }

    /// Validate a flow file without binding handlers.
    ///
    /// The resulting registry is meant for inspection and rendering; its steps
    /// fail if executed.
    pub fn outline(file: &FlowFile) -> Result<StepRegistry, FlowError> {
        let steps = file
            .steps
            .iter()
            .map(|def| {
                let handler: Arc<dyn StepHandler> = Arc::new(UnboundHandler {
                    step: def.name.clone(),
                });
                to_step(def, handler)
            })
            .collect();

        Ok(StepRegistry::build(assemble(file, steps))?)
    }
}

/// Carry a step entry over as-is; `StepRegistry::build` validates its shape
fn to_step(def: &StepDef, handler: Arc<dyn StepHandler>) -> Step {
    Step {
        name: def.name.clone(),
        kind: def.kind,
        triggers: def.triggers.to_vec(),
        condition: def.resolved_condition(),
        labels: def.labels.clone(),
        handler,
    }
}

fn assemble(file: &FlowFile, steps: Vec<Step>) -> WorkflowDefinition {
    let mut builder = WorkflowDefinition::builder(file.name.clone())
        .description(file.description.clone())
        .state_schema(file.state.clone().unwrap_or_default());
    if let Some(output) = &file.output {
        builder = builder.output(output.clone());
    }
    steps.into_iter().fold(builder, |b, step| b.step(step)).build()
}
