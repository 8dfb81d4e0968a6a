// SPDX-License-Identifier: MIT

//! Runtime trigger satisfaction
//!
//! One `TriggerResolver` exists per run. Each completion is fed in through
//! `record_completion`, which returns the consumers that just became READY.
//! Every consumer fires at most once per run: an AND consumer when its full
//! producer set has completed, a SINGLE or OR consumer on its first producer.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::step_registry::StepRegistry;
use super::types::{Condition, StepKind};

pub struct TriggerResolver<'a> {
    registry: &'a StepRegistry,
    /// consumer -> producers (or labels) completed so far
    satisfied: HashMap<String, HashSet<String>>,
    fired: HashSet<String>,
}

impl<'a> TriggerResolver<'a> {
    pub fn new(registry: &'a StepRegistry) -> Self {
        Self {
            registry,
            satisfied: HashMap::new(),
            fired: HashSet::new(),
        }
    }

    /// The trigger signals a completion emits: the step's own name, plus the
    /// router label when a router returns one of its declared labels.
    pub fn signals_for(&self, step: &str, output: &Value) -> Vec<String> {
        let mut signals = vec![step.to_string()];

        let is_router = self
            .registry
            .step(step)
            .is_some_and(|s| s.kind == StepKind::Router);
        if !is_router {
            return signals;
        }

        match output.as_str() {
            Some(label) if self.registry.router_declares(step, label) => {
                log::debug!("Router '{}' dispatched label '{}'", step, label);
                signals.push(label.to_string());
            }
            Some(label) => {
                log::warn!(
                    "Router '{}' returned undeclared label '{}'; nothing dispatched",
                    step,
                    label
                );
            }
            None => {
                log::warn!("Router '{}' returned a non-string output; no label dispatched", step);
            }
        }

        signals
    }

    /// Record a step completion and return newly READY consumers in
    /// declaration order.
    pub fn record_completion(&mut self, step: &str, output: &Value) -> Vec<String> {
        let signals = self.signals_for(step, output);
        self.record_signals(&signals)
    }

    /// Record already-computed trigger signals (see `signals_for`)
    pub fn record_signals(&mut self, signals: &[String]) -> Vec<String> {
        let mut ready = Vec::new();

        for signal in signals {
            for edge in self.registry.consumers_of(signal) {
                let satisfied = self.satisfied.entry(edge.consumer.clone()).or_default();
                satisfied.insert(signal.clone());

                if self.fired.contains(&edge.consumer) {
                    log::debug!(
                        "'{}' already fired; recorded '{}' without re-firing",
                        edge.consumer,
                        signal
                    );
                    continue;
                }

                let fires = match edge.condition {
                    Condition::Single | Condition::Or => true,
                    Condition::And => {
                        let index = self.registry.index_of(&edge.consumer);
                        index.is_some_and(|i| {
                            self.registry
                                .triggers_of(i)
                                .iter()
                                .all(|t| satisfied.contains(t))
                        })
                    }
                };

                if fires {
                    log::debug!("'{}' satisfied ({}) by '{}'", edge.consumer, edge.condition, signal);
                    self.fired.insert(edge.consumer.clone());
                    ready.push(edge.consumer.clone());
                }
            }
        }

        ready.sort_by_key(|name| self.registry.index_of(name));
        ready.dedup();
        ready
    }

    /// Whether a consumer has already fired in this run
    pub fn has_fired(&self, consumer: &str) -> bool {
        self.fired.contains(consumer)
    }

    /// Producers recorded so far for a consumer
    pub fn satisfied(&self, consumer: &str) -> Option<&HashSet<String>> {
        self.satisfied.get(consumer)
    }
}
