// SPDX-License-Identifier: MIT

//! Per-run bookkeeping

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::step_registry::StepRegistry;
use crate::flow::events::EventDispatcher;
use crate::flow::handler::StepInputs;
use crate::flow::persistence::{CompletedStep, SnapshotRecord};
use crate::flow::state::WorkflowState;

/// Lifecycle of a step within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
}

/// One execution of a workflow definition.
///
/// Owns the run's state, the ordered completion record, per-step statuses
/// and the run's event dispatcher.
pub struct WorkflowInstance {
    pub(crate) id: String,
    pub(crate) state: WorkflowState,
    pub(crate) completed: Vec<CompletedStep>,
    /// Indexed by step declaration position
    pub(crate) statuses: Vec<StepStatus>,
    /// Trigger signal (step name or router label) -> value it carried
    pub(crate) signals: HashMap<String, Value>,
    pub(crate) events: EventDispatcher,
    pub(crate) last_snapshot: Option<SnapshotRecord>,
}

impl WorkflowInstance {
    pub(crate) fn new(id: String, state: WorkflowState, step_count: usize) -> Self {
        Self {
            id,
            state,
            completed: Vec::new(),
            statuses: vec![StepStatus::Pending; step_count],
            signals: HashMap::new(),
            events: EventDispatcher::new(),
            last_snapshot: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn completed(&self) -> &[CompletedStep] {
        &self.completed
    }

    pub(crate) fn set_status(&mut self, index: usize, status: StepStatus) {
        self.statuses[index] = status;
    }

    pub(crate) fn status(&self, index: usize) -> StepStatus {
        self.statuses[index]
    }

    /// Record a completion and the signals it emitted
    pub(crate) fn complete(&mut self, index: usize, name: &str, output: Value, signals: &[String]) {
        for signal in signals {
            self.signals.insert(signal.clone(), output.clone());
        }
        self.completed.push(CompletedStep {
            name: name.to_string(),
            output,
        });
        self.statuses[index] = StepStatus::Completed;
    }

    /// Outputs of the triggers of the step at `index` that have fired so far
    pub(crate) fn inputs_for(&self, registry: &StepRegistry, index: usize) -> StepInputs {
        StepInputs::new(
            registry
                .triggers_of(index)
                .iter()
                .filter_map(|t| self.signals.get(t).map(|v| (t.clone(), v.clone())))
                .collect(),
        )
    }

    pub(crate) fn output_of(&self, step: &str) -> Option<&Value> {
        self.completed
            .iter()
            .rev()
            .find(|c| c.name == step)
            .map(|c| &c.output)
    }

    /// Statuses paired with step names, in declaration order
    pub(crate) fn named_statuses(&self, registry: &StepRegistry) -> Vec<(String, StepStatus)> {
        registry
            .steps()
            .iter()
            .zip(&self.statuses)
            .map(|(step, status)| (step.name.clone(), *status))
            .collect()
    }

    pub(crate) fn snapshot(&self, step: &str) -> SnapshotRecord {
        SnapshotRecord::new(
            self.id.clone(),
            step,
            self.state.to_json(),
            self.completed.clone(),
        )
    }
}
