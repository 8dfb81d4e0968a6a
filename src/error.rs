// SPDX-License-Identifier: MIT

//! Typed error handling for flowline-rs
//!
//! Definition problems are caught before any step runs, step failures are
//! wrapped with the failing step's name and the last persisted snapshot, and
//! persistence failures carry the backend cause.

use thiserror::Error;

use crate::flow::graph::StepStatus;
use crate::flow::persistence::SnapshotRecord;

/// Error type returned by units of work
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for flowline-rs
#[derive(Debug, Error)]
pub enum FlowError {
    /// The workflow definition failed validation
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// A step failed while the run was executing
    #[error(transparent)]
    Execution(Box<WorkflowExecutionError>),

    /// Snapshot storage failed where the failure cannot be ignored
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Resume was requested for an instance without any snapshot
    #[error("No snapshot found for instance '{0}'")]
    SnapshotNotFound(String),

    /// Resume was requested on a flow without a persistence backend
    #[error("Flow '{0}' has no persistence backend to resume from")]
    PersistenceDisabled(String),

    /// Configuration errors (invalid env values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl From<WorkflowExecutionError> for FlowError {
    fn from(err: WorkflowExecutionError) -> Self {
        Self::Execution(Box::new(err))
    }
}

impl FlowError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// The execution error, if this is one
    pub fn as_execution(&self) -> Option<&WorkflowExecutionError> {
        match self {
            Self::Execution(err) => Some(err),
            _ => None,
        }
    }
}

/// Registry-time validation failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("no start step")]
    NoStartStep,

    #[error("unknown trigger reference '{trigger}' in step '{step}'")]
    UnknownTrigger { step: String, trigger: String },

    #[error("duplicate step name '{0}'")]
    DuplicateStep(String),

    /// A listener or router declared without any trigger
    #[error("step '{0}' has no triggers")]
    MissingTriggers(String),

    /// SINGLE condition with more than one producer
    #[error("step '{step}' uses a SINGLE condition with {count} triggers")]
    AmbiguousSingle { step: String, count: usize },

    #[error("router '{router}' declares label '{label}' which is also a step name")]
    LabelCollision { router: String, label: String },

    #[error("output step '{0}' is not part of the definition")]
    UnknownOutputStep(String),

    /// Declarative definitions name a handler that was never registered
    #[error("no handler registered under '{handler}' for step '{step}'")]
    MissingHandler { step: String, handler: String },

    #[error("invalid step '{step}': {reason}")]
    InvalidStep { step: String, reason: String },
}

/// A unit of work returned an error while RUNNING
#[derive(Debug, Error)]
#[error("step '{step}' failed: {source}")]
pub struct DispatchError {
    pub step: String,
    #[source]
    pub source: BoxError,
}

/// Error surfaced to callers when a run halts on a failed step
#[derive(Debug, Error)]
#[error("workflow run {instance_id} failed at step '{step}'")]
pub struct WorkflowExecutionError {
    pub instance_id: String,
    pub step: String,
    #[source]
    pub source: DispatchError,
    /// Last snapshot persisted before the failure, if any
    pub snapshot: Option<SnapshotRecord>,
    /// Per-step status at the time the run halted, in declaration order
    pub statuses: Vec<(String, StepStatus)>,
}

impl WorkflowExecutionError {
    /// Status of a step when the run halted
    pub fn status_of(&self, step: &str) -> Option<StepStatus> {
        self.statuses
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, status)| *status)
    }
}

/// Snapshot storage failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timestamp error: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("{0}")]
    Backend(String),
}
