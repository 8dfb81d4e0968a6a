// SPDX-License-Identifier: MIT

//! Flow execution engine
//!
//! A run is a single-threaded dispatch loop over a FIFO of READY steps. Each
//! step moves PENDING -> READY -> RUNNING -> COMPLETED | FAILED. After a
//! completion the engine snapshots the run (best effort), asks the resolver
//! which consumers became READY and enqueues them in declaration order. The
//! first failure halts the whole run.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

use super::instance::{StepStatus, WorkflowInstance};
use super::resolver::TriggerResolver;
use super::step_registry::StepRegistry;
use super::types::WorkflowDefinition;
use crate::error::{DefinitionError, DispatchError, FlowError, WorkflowExecutionError};
use crate::flow::events::{EventDispatcher, EventSender, FlowEvent};
use crate::flow::persistence::{CompletedStep, FlowPersistence};
use crate::flow::state::WorkflowState;

/// Result of a run that reached its terminal condition
#[derive(Debug, Clone)]
pub struct FlowOutput {
    pub instance_id: String,
    /// Output of the designated output step, or of the last completed step
    pub output: Value,
    pub state: WorkflowState,
    /// Completed steps in completion order
    pub completed: Vec<CompletedStep>,
    /// Final status per step, in declaration order
    pub statuses: Vec<(String, StepStatus)>,
}

impl FlowOutput {
    pub fn status_of(&self, step: &str) -> Option<StepStatus> {
        self.statuses
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, status)| *status)
    }

    /// Whether a step completed in this run
    pub fn ran(&self, step: &str) -> bool {
        self.completed.iter().any(|c| c.name == step)
    }

    pub fn output_of(&self, step: &str) -> Option<&Value> {
        self.completed
            .iter()
            .find(|c| c.name == step)
            .map(|c| &c.output)
    }

    /// Step names in the order they completed
    pub fn completion_order(&self) -> Vec<&str> {
        self.completed.iter().map(|c| c.name.as_str()).collect()
    }
}

/// An executable workflow: a validated registry plus an optional snapshot
/// backend.
///
/// A `Flow` holds no per-run data, so one instance (typically behind an
/// `Arc`) can drive any number of independent runs concurrently.
pub struct Flow {
    registry: Arc<StepRegistry>,
    persistence: Option<Arc<dyn FlowPersistence>>,
}

impl Flow {
    /// Validate a definition and create a flow without persistence
    pub fn new(definition: WorkflowDefinition) -> Result<Self, DefinitionError> {
        Ok(Self::from_registry(StepRegistry::build(definition)?))
    }

    pub fn from_registry(registry: StepRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            persistence: None,
        }
    }

    /// Snapshot every completed step to `persistence`
    pub fn with_persistence(mut self, persistence: Arc<dyn FlowPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn name(&self) -> &str {
        self.registry.name()
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn persistence(&self) -> Option<&Arc<dyn FlowPersistence>> {
        self.persistence.as_ref()
    }

    /// Start a fresh run.
    ///
    /// `state` seeds the run; without it the definition's state schema
    /// provides the defaults. Every START step runs, in declaration order.
    pub async fn kickoff(&self, state: Option<WorkflowState>) -> Result<FlowOutput, FlowError> {
        self.start_run(state, EventDispatcher::new()).await
    }

    /// Like `kickoff`, streaming run events to `tx`
    pub async fn kickoff_with_events(
        &self,
        state: Option<WorkflowState>,
        tx: EventSender,
    ) -> Result<FlowOutput, FlowError> {
        let mut events = EventDispatcher::new();
        events.subscribe(tx);
        self.start_run(state, events).await
    }

    /// Continue an interrupted run from its newest snapshot.
    ///
    /// State and the completed-step record are restored; steps that had
    /// already completed are not run again.
    pub async fn resume(&self, instance_id: &str) -> Result<FlowOutput, FlowError> {
        self.resume_run(instance_id, EventDispatcher::new()).await
    }

    pub async fn resume_with_events(
        &self,
        instance_id: &str,
        tx: EventSender,
    ) -> Result<FlowOutput, FlowError> {
        let mut events = EventDispatcher::new();
        events.subscribe(tx);
        self.resume_run(instance_id, events).await
    }

    async fn start_run(
        &self,
        state: Option<WorkflowState>,
        events: EventDispatcher,
    ) -> Result<FlowOutput, FlowError> {
        let state = state
            .unwrap_or_else(|| WorkflowState::new(self.registry.definition().state_schema()));
        let mut instance = WorkflowInstance::new(
            Uuid::new_v4().to_string(),
            state,
            self.registry.steps().len(),
        );
        instance.events = events;

        log::info!(
            "Starting flow '{}' (instance {})",
            self.name(),
            instance.id
        );
        instance
            .events
            .emit(FlowEvent::FlowStarted {
                instance_id: instance.id.clone(),
                flow: self.name().to_string(),
                resumed: false,
            });

        let queue: VecDeque<usize> = self
            .registry
            .start_steps()
            .iter()
            .filter_map(|name| self.registry.index_of(name))
            .collect();

        let resolver = TriggerResolver::new(&self.registry);
        self.drive(instance, resolver, queue).await
    }

    async fn resume_run(
        &self,
        instance_id: &str,
        events: EventDispatcher,
    ) -> Result<FlowOutput, FlowError> {
        let persistence = self
            .persistence
            .as_ref()
            .ok_or_else(|| FlowError::PersistenceDisabled(self.name().to_string()))?;

        let snapshot = persistence
            .load_latest_snapshot(instance_id)
            .await?
            .ok_or_else(|| FlowError::SnapshotNotFound(instance_id.to_string()))?;

        let state = WorkflowState::from_json(
            self.registry.definition().state_schema(),
            snapshot.state.clone(),
        );
        let mut instance = WorkflowInstance::new(
            snapshot.instance_id.clone(),
            state,
            self.registry.steps().len(),
        );
        instance.events = events;

        // Replay completions so the resolver knows which consumers already fired
        let mut resolver = TriggerResolver::new(&self.registry);
        let mut fired = Vec::new();
        for done in &snapshot.completed {
            let Some(index) = self.registry.index_of(&done.name) else {
                log::warn!(
                    "Snapshot of instance {} names unknown step '{}'; ignoring it",
                    instance_id,
                    done.name
                );
                continue;
            };
            if instance.status(index) == StepStatus::Completed {
                continue;
            }
            let signals = resolver.signals_for(&done.name, &done.output);
            instance.complete(index, &done.name, done.output.clone(), &signals);
            fired.extend(resolver.record_signals(&signals));
        }
        instance.last_snapshot = Some(snapshot);

        let mut pending: Vec<usize> = self
            .registry
            .start_steps()
            .iter()
            .chain(fired.iter())
            .filter_map(|name| self.registry.index_of(name))
            .filter(|&i| instance.status(i) != StepStatus::Completed)
            .collect();
        pending.sort_unstable();
        pending.dedup();

        log::info!(
            "Resuming flow '{}' (instance {}): {} steps already completed, {} ready",
            self.name(),
            instance.id,
            instance.completed.len(),
            pending.len()
        );
        instance
            .events
            .emit(FlowEvent::FlowStarted {
                instance_id: instance.id.clone(),
                flow: self.name().to_string(),
                resumed: true,
            });

        self.drive(instance, resolver, pending.into()).await
    }

    /// The dispatch loop: run READY steps one at a time until none remain
    async fn drive(
        &self,
        mut instance: WorkflowInstance,
        mut resolver: TriggerResolver<'_>,
        mut queue: VecDeque<usize>,
    ) -> Result<FlowOutput, FlowError> {
        for &index in &queue {
            instance.set_status(index, StepStatus::Ready);
        }

        while let Some(index) = queue.pop_front() {
            let step = &self.registry.steps()[index];

            instance.set_status(index, StepStatus::Running);
            instance
                .events
                .emit(FlowEvent::StepStarted {
                    instance_id: instance.id.clone(),
                    step: step.name.clone(),
                });

            let inputs = instance.inputs_for(&self.registry, index);
            log::info!("Executing step: {}", step.name);

            match step.handler.run(&mut instance.state, &inputs).await {
                Ok(output) => {
                    let signals = resolver.signals_for(&step.name, &output);
                    instance.complete(index, &step.name, output.clone(), &signals);
                    log::info!("Step {} completed", step.name);

                    instance
                        .events
                        .emit(FlowEvent::StepCompleted {
                            instance_id: instance.id.clone(),
                            step: step.name.clone(),
                            output,
                        });

                    self.persist(&mut instance, &step.name).await;

                    for consumer in resolver.record_signals(&signals) {
                        let Some(next) = self.registry.index_of(&consumer) else {
                            continue;
                        };
                        if instance.status(next) == StepStatus::Pending {
                            instance.set_status(next, StepStatus::Ready);
                            queue.push_back(next);
                        }
                    }
                }
                Err(source) => {
                    log::error!("Step {} failed: {}", step.name, source);
                    instance.set_status(index, StepStatus::Failed);
                    instance
                        .events
                        .emit(FlowEvent::StepFailed {
                            instance_id: instance.id.clone(),
                            step: step.name.clone(),
                            error: source.to_string(),
                        });

                    let statuses = instance.named_statuses(&self.registry);
                    return Err(WorkflowExecutionError {
                        instance_id: instance.id.clone(),
                        step: step.name.clone(),
                        source: DispatchError {
                            step: step.name.clone(),
                            source,
                        },
                        snapshot: instance.last_snapshot.take(),
                        statuses,
                    }
                    .into());
                }
            }
        }

        let output = self.final_output(&instance);
        log::info!(
            "Flow '{}' finished (instance {}) after {} steps",
            self.name(),
            instance.id,
            instance.completed.len()
        );
        instance
            .events
            .emit(FlowEvent::FlowFinished {
                instance_id: instance.id.clone(),
                output: output.clone(),
            });

        let statuses = instance.named_statuses(&self.registry);
        Ok(FlowOutput {
            instance_id: instance.id,
            output,
            state: instance.state,
            completed: instance.completed,
            statuses,
        })
    }

    /// Best-effort snapshot; a failed save is logged and the run continues
    async fn persist(&self, instance: &mut WorkflowInstance, step: &str) {
        let Some(persistence) = &self.persistence else {
            return;
        };

        let record = instance.snapshot(step);
        match persistence.save_snapshot(&record).await {
            Ok(()) => instance.last_snapshot = Some(record),
            Err(e) => log::warn!(
                "Failed to persist snapshot for instance {} after step '{}': {}",
                instance.id,
                step,
                e
            ),
        }
    }

    fn final_output(&self, instance: &WorkflowInstance) -> Value {
        let output = match self.registry.definition().output_step() {
            Some(step) => instance.output_of(step),
            None => instance.completed.last().map(|c| &c.output),
        };
        output.cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BoxError, PersistenceError};
    use crate::flow::events::event_channel;
    use crate::flow::graph::types::Condition;
    use crate::flow::handler::{handler_fn, StepHandler, StepInputs};
    use crate::flow::persistence::{InMemoryPersistence, SnapshotRecord};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Handler that records its invocation order and returns a fixed output
    struct RecordingHandler {
        name: String,
        output: Value,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl StepHandler for RecordingHandler {
        async fn run(
            &self,
            _state: &mut WorkflowState,
            _inputs: &StepInputs,
        ) -> Result<Value, BoxError> {
            self.log.lock().unwrap().push(self.name.clone());
            Ok(self.output.clone())
        }
    }

    /// Handler that captures the inputs it was called with
    struct InputCapturingHandler {
        captured: Arc<Mutex<Option<StepInputs>>>,
    }

    #[async_trait]
    impl StepHandler for InputCapturingHandler {
        async fn run(
            &self,
            _state: &mut WorkflowState,
            inputs: &StepInputs,
        ) -> Result<Value, BoxError> {
            *self.captured.lock().unwrap() = Some(inputs.clone());
            Ok(json!("captured"))
        }
    }

    struct FailingPersistence;

    #[async_trait]
    impl FlowPersistence for FailingPersistence {
        async fn save_snapshot(&self, _record: &SnapshotRecord) -> Result<(), PersistenceError> {
            Err(PersistenceError::Backend("disk full".to_string()))
        }

        async fn load_latest_snapshot(
            &self,
            _instance_id: &str,
        ) -> Result<Option<SnapshotRecord>, PersistenceError> {
            Err(PersistenceError::Backend("unreadable".to_string()))
        }

        async fn list_snapshots(
            &self,
            _instance_id: &str,
        ) -> Result<Vec<SnapshotRecord>, PersistenceError> {
            Ok(vec![])
        }
    }

    fn recorder(
        name: &str,
        output: Value,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn StepHandler> {
        Arc::new(RecordingHandler {
            name: name.to_string(),
            output,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn test_single_start_runs_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let def = WorkflowDefinition::builder("seq")
            .listen("b", ["a"], Condition::Single, recorder("b", json!("B"), &log))
            .start("a", recorder("a", json!("A"), &log))
            .build();
        let flow = Flow::new(def).unwrap();

        let result = flow.kickoff(None).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(result.output, json!("B"));
        assert_eq!(result.status_of("b"), Some(StepStatus::Completed));
    }

    #[tokio::test]
    async fn test_steps_share_state() {
        let def = WorkflowDefinition::builder("state")
            .start(
                "scope",
                handler_fn(|state, _| {
                    state.update("tasks", json!(["define scope"]));
                    Ok(json!(1))
                }),
            )
            .listen(
                "plan",
                ["scope"],
                Condition::Single,
                handler_fn(|state, _| {
                    let count = state
                        .get("tasks")
                        .and_then(|t| t.as_array())
                        .map(|t| t.len())
                        .unwrap_or(0);
                    state.update("task_count", json!(count));
                    Ok(json!(count))
                }),
            )
            .build();
        let flow = Flow::new(def).unwrap();

        let result = flow.kickoff(None).await.unwrap();
        assert_eq!(result.state.get("task_count"), Some(&json!(1)));
        assert_eq!(result.output, json!(1));
    }

    #[tokio::test]
    async fn test_kickoff_with_existing_state() {
        let def = WorkflowDefinition::builder("seeded")
            .start(
                "read",
                handler_fn(|state, _| Ok(state.get("project").cloned().unwrap_or(Value::Null))),
            )
            .build();
        let flow = Flow::new(def).unwrap();

        let mut state = WorkflowState::empty();
        state.update("project", json!("PRJ-001"));
        let result = flow.kickoff(Some(state)).await.unwrap();
        assert_eq!(result.output, json!("PRJ-001"));
    }

    #[tokio::test]
    async fn test_listener_receives_producer_outputs() {
        let captured = Arc::new(Mutex::new(None));
        let def = WorkflowDefinition::builder("inputs")
            .start("a", handler_fn(|_, _| Ok(json!("from a"))))
            .start("b", handler_fn(|_, _| Ok(json!("from b"))))
            .listen(
                "join",
                ["a", "b"],
                Condition::And,
                Arc::new(InputCapturingHandler {
                    captured: captured.clone(),
                }),
            )
            .build();
        let flow = Flow::new(def).unwrap();
        flow.kickoff(None).await.unwrap();

        let inputs = captured.lock().unwrap().clone().unwrap();
        assert_eq!(inputs.get("a"), Some(&json!("from a")));
        assert_eq!(inputs.get("b"), Some(&json!("from b")));
        assert_eq!(inputs.len(), 2);
    }

    #[tokio::test]
    async fn test_start_steps_receive_no_inputs() {
        let captured = Arc::new(Mutex::new(None));
        let def = WorkflowDefinition::builder("root")
            .start(
                "a",
                Arc::new(InputCapturingHandler {
                    captured: captured.clone(),
                }),
            )
            .build();
        Flow::new(def).unwrap().kickoff(None).await.unwrap();

        assert!(captured.lock().unwrap().clone().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_output_step() {
        let def = WorkflowDefinition::builder("out")
            .start("a", handler_fn(|_, _| Ok(json!("charter"))))
            .listen("b", ["a"], Condition::Single, handler_fn(|_, _| Ok(json!("log"))))
            .output("a")
            .build();
        let result = Flow::new(def).unwrap().kickoff(None).await.unwrap();
        assert_eq!(result.output, json!("charter"));
    }

    #[tokio::test]
    async fn test_failure_halts_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let def = WorkflowDefinition::builder("fail")
            .start("a", handler_fn(|_, _| Err("estimate unavailable".into())))
            .start("b", recorder("b", json!(null), &log))
            .listen("c", ["a"], Condition::Single, recorder("c", json!(null), &log))
            .build();
        let flow = Flow::new(def).unwrap();

        let err = flow.kickoff(None).await.unwrap_err();
        let exec = err.as_execution().expect("execution error");

        assert_eq!(exec.step, "a");
        assert!(exec.source.to_string().contains("estimate unavailable"));
        assert_eq!(exec.status_of("a"), Some(StepStatus::Failed));
        assert_eq!(exec.status_of("b"), Some(StepStatus::Ready));
        assert_eq!(exec.status_of("c"), Some(StepStatus::Pending));
        assert!(exec.snapshot.is_none());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_after_each_completion() {
        let store = InMemoryPersistence::new();
        let def = WorkflowDefinition::builder("snap")
            .start(
                "a",
                handler_fn(|state, _| {
                    state.update("step", json!("a"));
                    Ok(json!(1))
                }),
            )
            .listen(
                "b",
                ["a"],
                Condition::Single,
                handler_fn(|state, _| {
                    state.update("step", json!("b"));
                    Ok(json!(2))
                }),
            )
            .build();
        let flow = Flow::new(def)
            .unwrap()
            .with_persistence(Arc::new(store.clone()));

        let result = flow.kickoff(None).await.unwrap();
        let snapshots = store.list_snapshots(&result.instance_id).await.unwrap();

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].step_name, "a");
        assert_eq!(snapshots[0].state, json!({"step": "a"}));
        assert_eq!(snapshots[1].completed.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_carries_last_snapshot() {
        let store = InMemoryPersistence::new();
        let def = WorkflowDefinition::builder("snap-fail")
            .start("a", handler_fn(|_, _| Ok(json!("done"))))
            .listen("b", ["a"], Condition::Single, handler_fn(|_, _| Err("boom".into())))
            .build();
        let flow = Flow::new(def)
            .unwrap()
            .with_persistence(Arc::new(store));

        let err = flow.kickoff(None).await.unwrap_err();
        let snapshot = err.as_execution().unwrap().snapshot.clone().unwrap();
        assert_eq!(snapshot.step_name, "a");
    }

    #[tokio::test]
    async fn test_save_failure_is_not_fatal() {
        let def = WorkflowDefinition::builder("best-effort")
            .start("a", handler_fn(|_, _| Ok(json!("ok"))))
            .build();
        let flow = Flow::new(def)
            .unwrap()
            .with_persistence(Arc::new(FailingPersistence));

        let result = flow.kickoff(None).await.unwrap();
        assert_eq!(result.output, json!("ok"));
    }

    #[tokio::test]
    async fn test_resume_load_failure_surfaces() {
        let def = WorkflowDefinition::builder("load-fail")
            .start("a", handler_fn(|_, _| Ok(json!("ok"))))
            .build();
        let flow = Flow::new(def)
            .unwrap()
            .with_persistence(Arc::new(FailingPersistence));

        let err = flow.resume("run-1").await.unwrap_err();
        assert!(matches!(err, FlowError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_resume_without_persistence() {
        let def = WorkflowDefinition::builder("no-store")
            .start("a", handler_fn(|_, _| Ok(json!("ok"))))
            .build();
        let err = Flow::new(def).unwrap().resume("run-1").await.unwrap_err();
        assert!(matches!(err, FlowError::PersistenceDisabled(_)));
    }

    #[tokio::test]
    async fn test_resume_unknown_instance() {
        let def = WorkflowDefinition::builder("missing")
            .start("a", handler_fn(|_, _| Ok(json!("ok"))))
            .build();
        let flow = Flow::new(def)
            .unwrap()
            .with_persistence(Arc::new(InMemoryPersistence::new()));

        let err = flow.resume("never-ran").await.unwrap_err();
        assert!(matches!(err, FlowError::SnapshotNotFound(id) if id == "never-ran"));
    }

    #[tokio::test]
    async fn test_events_follow_state_machine() {
        let def = WorkflowDefinition::builder("events")
            .start("a", handler_fn(|_, _| Ok(json!("A"))))
            .listen("b", ["a"], Condition::Single, handler_fn(|_, _| Ok(json!("B"))))
            .build();
        let flow = Flow::new(def).unwrap();
        let (tx, mut rx) = event_channel();

        let result = flow.kickoff_with_events(None, tx).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 6);
        assert!(matches!(&events[0], FlowEvent::FlowStarted { resumed: false, .. }));
        assert!(matches!(&events[1], FlowEvent::StepStarted { step, .. } if step == "a"));
        assert!(matches!(&events[2], FlowEvent::StepCompleted { step, .. } if step == "a"));
        assert!(matches!(&events[3], FlowEvent::StepStarted { step, .. } if step == "b"));
        assert!(
            matches!(&events[5], FlowEvent::FlowFinished { instance_id, output } if *instance_id == result.instance_id && *output == json!("B"))
        );
    }

    #[tokio::test]
    async fn test_long_run_with_unread_events_finishes() {
        let mut builder =
            WorkflowDefinition::builder("long-chain").start("s0", handler_fn(|_, _| Ok(json!(0))));
        for i in 1..20 {
            builder = builder.listen(
                format!("s{}", i),
                [format!("s{}", i - 1)],
                Condition::Single,
                handler_fn(move |_, _| Ok(json!(i))),
            );
        }
        let flow = Flow::new(builder.build()).unwrap();
        let (tx, mut rx) = event_channel();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(3),
            flow.kickoff_with_events(None, tx),
        )
        .await
        .expect("run finished without a reader")
        .unwrap();

        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(result.output, json!(19));
        assert_eq!(count, 42);
    }
}
