// SPDX-License-Identifier: MIT

//! Trigger-graph workflow execution
//!
//! This module provides the step registry that validates definitions, the
//! resolver that tracks trigger satisfaction during a run, and the `Flow`
//! executor that dispatches steps.

pub mod executor;
mod instance;
pub mod render;
pub mod resolver;
pub mod step_registry;
pub mod types;

pub use executor::{Flow, FlowOutput};
pub use instance::{StepStatus, WorkflowInstance};
pub use resolver::TriggerResolver;
pub use step_registry::{StepRegistry, TriggerEdge};
pub use types::{Condition, Step, StepKind, WorkflowDefinition, WorkflowDefinitionBuilder};
