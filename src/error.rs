use std::sync::Arc;
use thiserror::Error;

use crate::stage::StageKind;

/// Errors produced by the pipeline runtime and its components.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The builder was asked to build a pipeline with no stages.
    #[error("pipeline has no stages")]
    NoStages,

    /// Two stages were registered under the same name.
    #[error("duplicate stage name '{0}'")]
    DuplicateStage(String),

    /// An edge references a stage name that was never added.
    #[error("edge references unknown stage '{0}'")]
    UnknownStage(String),

    /// The stage graph contains a cycle (including self-loops).
    #[error("pipeline graph is cyclic at stage '{0}'")]
    CyclicGraph(String),

    /// Invalid configuration detected at build time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `execute` was called on a pipeline that is shutting down.
    #[error("pipeline is shutting down")]
    ShuttingDown,

    /// Graceful shutdown did not drain in-flight executions in time.
    #[error("shutdown timed out with executions still in flight")]
    ShutdownTimeout,

    /// A stage driver terminated with an error.
    ///
    /// Wraps the cause so both the stage name and kind survive into the
    /// display while the unwrap chain preserves the original error.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Context-window truncation under `TruncationStrategy::Fail` found the
    /// accumulated messages over the effective budget.
    #[error("token budget exceeded: {total} tokens > effective budget {budget}")]
    TokenBudgetExceeded {
        /// Total tokens of the accumulated messages.
        total: usize,
        /// Effective budget (`token_budget - reserve_for_output`).
        budget: usize,
    },

    /// The execution was cancelled via its cancellation token.
    #[error("pipeline was cancelled")]
    Cancelled,

    /// An `Error` element observed on the output stream.
    ///
    /// Returned by [`Pipeline::execute_sync`](crate::Pipeline::execute_sync)
    /// when the drained output contained error elements; carries the last one.
    #[error("{0}")]
    Stream(Arc<PipelineError>),

    /// JSON (de)serialization failed at the serde level.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

/// A stage failure carrying the stage's name and declared kind.
#[derive(Error, Debug)]
#[error("stage '{name}' ({kind}) failed: {source}")]
pub struct StageError {
    /// Name of the failing stage.
    pub name: String,
    /// Declared kind of the failing stage.
    pub kind: StageKind,
    /// The underlying cause.
    #[source]
    pub source: Box<PipelineError>,
}

impl StageError {
    /// Wrap an error with the failing stage's identity.
    pub fn new(name: impl Into<String>, kind: StageKind, source: PipelineError) -> Self {
        Self {
            name: name.into(),
            kind,
            source: Box::new(source),
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
