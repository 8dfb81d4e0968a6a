// SPDX-License-Identifier: MIT

pub mod builder;
pub mod events;
pub mod graph;
pub mod handler;
pub mod loader;
pub mod persistence;
pub mod registry;
pub mod state;
pub mod types;

pub use graph::{Condition, Flow, FlowOutput, StepKind, StepStatus, WorkflowDefinition};
pub use handler::{handler_fn, StepHandler, StepInputs, SubflowHandler};
