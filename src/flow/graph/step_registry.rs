// SPDX-License-Identifier: MIT

//! Step discovery and validation
//!
//! `StepRegistry::build` is a pure pass over a `WorkflowDefinition`: it
//! checks the definition's invariants and derives the producer -> consumer
//! trigger map. Nothing runs until a registry has been built successfully.

use std::collections::{HashMap, HashSet, VecDeque};

use super::types::{Condition, Step, StepKind, WorkflowDefinition};
use crate::error::DefinitionError;

/// A derived `(producer, consumer, condition)` relation.
///
/// `producer` is either a step name or a router label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEdge {
    pub producer: String,
    pub consumer: String,
    pub condition: Condition,
}

/// Validated view of a workflow definition
#[derive(Debug, Clone)]
pub struct StepRegistry {
    definition: WorkflowDefinition,
    /// Triggers per step, deduplicated, in declaration order
    triggers: Vec<Vec<String>>,
    index: HashMap<String, usize>,
    start_steps: Vec<String>,
    /// producer (step or label) -> consumers in declaration order
    trigger_map: HashMap<String, Vec<TriggerEdge>>,
    /// label -> routers that declare it
    labels: HashMap<String, Vec<String>>,
}

impl StepRegistry {
    /// Validate a definition and derive its trigger map
    pub fn build(definition: WorkflowDefinition) -> Result<Self, DefinitionError> {
        let steps = definition.steps();

        if !steps.iter().any(|s| s.kind == StepKind::Start) {
            return Err(DefinitionError::NoStartStep);
        }

        let mut index = HashMap::new();
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.name.clone(), i).is_some() {
                return Err(DefinitionError::DuplicateStep(step.name.clone()));
            }
        }

        let mut labels: HashMap<String, Vec<String>> = HashMap::new();
        for step in steps {
            for label in &step.labels {
                if index.contains_key(label) {
                    return Err(DefinitionError::LabelCollision {
                        router: step.name.clone(),
                        label: label.clone(),
                    });
                }
                let routers = labels.entry(label.clone()).or_default();
                if !routers.contains(&step.name) {
                    routers.push(step.name.clone());
                }
            }
        }

        let mut triggers = Vec::with_capacity(steps.len());
        let mut start_steps = Vec::new();
        let mut trigger_map: HashMap<String, Vec<TriggerEdge>> = HashMap::new();

        for step in steps {
            validate_shape(step)?;

            let mut seen = HashSet::new();
            let deduped: Vec<String> = step
                .triggers
                .iter()
                .filter(|t| seen.insert(t.as_str()))
                .cloned()
                .collect();

            if step.condition == Condition::Single && deduped.len() > 1 {
                return Err(DefinitionError::AmbiguousSingle {
                    step: step.name.clone(),
                    count: deduped.len(),
                });
            }

            for trigger in &deduped {
                if !index.contains_key(trigger) && !labels.contains_key(trigger) {
                    return Err(DefinitionError::UnknownTrigger {
                        step: step.name.clone(),
                        trigger: trigger.clone(),
                    });
                }
                trigger_map
                    .entry(trigger.clone())
                    .or_default()
                    .push(TriggerEdge {
                        producer: trigger.clone(),
                        consumer: step.name.clone(),
                        condition: step.condition,
                    });
            }

            if step.kind == StepKind::Start {
                start_steps.push(step.name.clone());
            }
            triggers.push(deduped);
        }

        if let Some(output) = definition.output_step() {
            if !index.contains_key(output) {
                return Err(DefinitionError::UnknownOutputStep(output.to_string()));
            }
        }

        log::debug!(
            "Registered flow '{}': {} steps, {} start steps, {} trigger sources",
            definition.name(),
            steps.len(),
            start_steps.len(),
            trigger_map.len()
        );

        Ok(Self {
            definition,
            triggers,
            index,
            start_steps,
            trigger_map,
            labels,
        })
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Steps in declaration order
    pub fn steps(&self) -> &[Step] {
        self.definition.steps()
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.index.get(name).map(|&i| &self.steps()[i])
    }

    /// Declaration position of a step
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// START steps in declaration order
    pub fn start_steps(&self) -> &[String] {
        &self.start_steps
    }

    /// Deduplicated triggers of the step at `index`
    pub fn triggers_of(&self, index: usize) -> &[String] {
        &self.triggers[index]
    }

    /// Consumers registered against a producer name or label
    pub fn consumers_of(&self, producer: &str) -> &[TriggerEdge] {
        self.trigger_map
            .get(producer)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn trigger_map(&self) -> &HashMap<String, Vec<TriggerEdge>> {
        &self.trigger_map
    }

    /// Whether `label` is declared by `router`
    pub fn router_declares(&self, router: &str, label: &str) -> bool {
        self.labels
            .get(label)
            .is_some_and(|routers| routers.iter().any(|r| r == router))
    }

    /// Routers declaring a label
    pub fn routers_for_label(&self, label: &str) -> &[String] {
        self.labels.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_label(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    /// All edges, ordered by consumer declaration then trigger order
    pub fn edges(&self) -> Vec<TriggerEdge> {
        self.steps()
            .iter()
            .zip(&self.triggers)
            .flat_map(|(step, triggers)| {
                triggers.iter().map(move |t| TriggerEdge {
                    producer: t.clone(),
                    consumer: step.name.clone(),
                    condition: step.condition,
                })
            })
            .collect()
    }

    /// Depth of every reachable step, counting START steps as level 0.
    ///
    /// A label edge counts as one hop from the router that declares it.
    /// Steps unreachable from any START step are absent.
    pub fn levels(&self) -> HashMap<String, usize> {
        let mut levels = HashMap::new();
        let mut queue: VecDeque<(String, usize)> =
            self.start_steps.iter().map(|s| (s.clone(), 0)).collect();

        while let Some((name, level)) = queue.pop_front() {
            if levels.contains_key(&name) {
                continue;
            }
            levels.insert(name.clone(), level);

            let mut sources = vec![name.clone()];
            if let Some(step) = self.step(&name) {
                sources.extend(step.labels.iter().cloned());
            }
            for source in sources {
                for edge in self.consumers_of(&source) {
                    if !levels.contains_key(&edge.consumer) {
                        queue.push_back((edge.consumer.clone(), level + 1));
                    }
                }
            }
        }

        levels
    }
}

fn validate_shape(step: &Step) -> Result<(), DefinitionError> {
    let invalid = |reason: &str| DefinitionError::InvalidStep {
        step: step.name.clone(),
        reason: reason.to_string(),
    };

    if step.name.trim().is_empty() {
        return Err(invalid("step name is empty"));
    }

    match step.kind {
        StepKind::Start => {
            if !step.triggers.is_empty() {
                return Err(invalid("start steps cannot have triggers"));
            }
        }
        StepKind::Listener | StepKind::Router => {
            if step.triggers.is_empty() {
                return Err(DefinitionError::MissingTriggers(step.name.clone()));
            }
        }
    }

    if step.kind != StepKind::Router && !step.labels.is_empty() {
        return Err(invalid("only routers can declare labels"));
    }

    Ok(())
}
