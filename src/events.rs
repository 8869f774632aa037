//! Event system for pipeline and stage lifecycle hooks.
//!
//! Provides an optional, non-intrusive way to observe execution. The
//! scheduler emits events as the pipeline starts, as each stage task starts
//! and finishes, and when the execution completes or fails. Users implement
//! [`EventEmitter`] to receive them for logging, tracing UIs, or metrics.

use std::sync::Arc;
use std::time::Duration;

use crate::stage::StageKind;

/// Events emitted during pipeline execution.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// An execution has started.
    PipelineStarted {
        /// Number of stages in the pipeline.
        stage_count: usize,
    },
    /// An execution finished with no stage errors.
    PipelineCompleted {
        /// Wall-clock duration of the execution.
        duration: Duration,
    },
    /// An execution finished after at least one stage failed.
    PipelineFailed {
        /// Display of the first stage error.
        error: String,
        /// Wall-clock duration of the execution.
        duration: Duration,
    },
    /// A stage task has started.
    StageStarted {
        /// Stage name.
        name: String,
        /// Position of the stage in the pipeline's stage list.
        index: usize,
        /// Declared stage kind.
        kind: StageKind,
    },
    /// A stage driver returned successfully.
    StageCompleted {
        /// Stage name.
        name: String,
        /// Position of the stage in the pipeline's stage list.
        index: usize,
        /// Wall-clock duration of the stage task.
        duration: Duration,
    },
    /// A stage driver returned an error.
    StageFailed {
        /// Stage name.
        name: String,
        /// Position of the stage in the pipeline's stage list.
        index: usize,
        /// Display of the stage error.
        error: String,
        /// Wall-clock duration of the stage task.
        duration: Duration,
    },
}

/// Handler for pipeline lifecycle events.
///
/// Implement this trait to receive stage timings and completion signals
/// during execution. Entirely optional -- pipelines run without an emitter.
///
/// # Example
///
/// ```
/// use streamweave::events::{EventEmitter, PipelineEvent};
///
/// struct PrintEmitter;
///
/// impl EventEmitter for PrintEmitter {
///     fn emit(&self, event: PipelineEvent) {
///         match event {
///             PipelineEvent::StageStarted { name, .. } => println!("[start] {}", name),
///             PipelineEvent::StageCompleted { name, duration, .. } => {
///                 println!("[done] {} in {:?}", name, duration)
///             }
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Called for every lifecycle event.
    fn emit(&self, event: PipelineEvent);
}

/// Emit an event if an emitter is present. No-op otherwise.
pub(crate) fn emit(emitter: &Option<Arc<dyn EventEmitter>>, event: PipelineEvent) {
    if let Some(ref e) = emitter {
        e.emit(event);
    }
}

/// An [`EventEmitter`] backed by a closure.
///
/// # Example
///
/// ```
/// use streamweave::events::{FnEventEmitter, PipelineEvent};
/// use std::sync::Arc;
///
/// let emitter = Arc::new(FnEventEmitter(|event: PipelineEvent| {
///     if let PipelineEvent::PipelineFailed { error, .. } = event {
///         eprintln!("failed: {}", error);
///     }
/// }));
/// ```
pub struct FnEventEmitter<F: Fn(PipelineEvent) + Send + Sync>(pub F);

impl<F: Fn(PipelineEvent) + Send + Sync> EventEmitter for FnEventEmitter<F> {
    fn emit(&self, event: PipelineEvent) {
        (self.0)(event);
    }
}
