//! Execution internals: channel wiring, stage tasks, output collection,
//! timeout monitoring, and error aggregation.
//!
//! One bounded channel is created per stage, keyed by stage name. A stage
//! with no in-edges reads the pipeline input; every other stage reads its
//! upstream's output channel. Each stage driver runs as its own task; a
//! collector task drains the leaf channels sequentially into the pipeline
//! output; an optional monitor task turns the execution timeout into a
//! cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, StageError};
use crate::events::{emit, EventEmitter, PipelineEvent};
use crate::stage::{forward, next_element, ElementReceiver, ElementSender, Stage};

/// The immutable execution plan shared by every `execute` call.
pub(crate) struct Executor {
    pub(crate) stages: Vec<Arc<dyn Stage>>,
    /// `to -> [from, ...]` in edge insertion order.
    pub(crate) upstreams: HashMap<String, Vec<String>>,
    /// Leaf stage names in stage-list order.
    pub(crate) leaves: Vec<String>,
    pub(crate) config: PipelineConfig,
    pub(crate) emitter: Option<Arc<dyn EventEmitter>>,
}

impl Executor {
    /// Wire channels, launch every task, and return the pipeline output.
    ///
    /// The supervisor task joins stage tasks and the collector, records the
    /// first stage error, and emits the completion event; it is spawned on
    /// `tracker` so shutdown can wait for it.
    pub(crate) fn launch(
        &self,
        token: CancellationToken,
        input: ElementReceiver,
        tracker: &TaskTracker,
    ) -> ElementReceiver {
        let buffer = self.config.channel_buffer_size;
        let stage_count = self.stages.len();

        let mut txs: HashMap<String, ElementSender> = HashMap::with_capacity(stage_count);
        let mut rxs: HashMap<String, ElementReceiver> = HashMap::with_capacity(stage_count);
        for stage in &self.stages {
            let (tx, rx) = flume::bounded(buffer);
            txs.insert(stage.name().to_string(), tx);
            rxs.insert(stage.name().to_string(), rx);
        }

        let (out_tx, out_rx) = flume::bounded(buffer);
        let (err_tx, err_rx) = flume::bounded::<StageError>(stage_count);

        emit(&self.emitter, PipelineEvent::PipelineStarted { stage_count });
        let started = Instant::now();

        self.spawn_timeout_monitor(&token, stage_count);

        let mut join_set = JoinSet::new();
        for (index, stage) in self.stages.iter().enumerate() {
            let name = stage.name().to_string();
            let stage_input = match self.upstreams.get(&name) {
                None => input.clone(),
                Some(list) if list.is_empty() => input.clone(),
                Some(list) => {
                    if list.len() > 1 {
                        warn!(
                            stage = %name,
                            upstreams = ?list,
                            "multiple upstream edges; using the first (fan-in needs an explicit merge)"
                        );
                    }
                    rxs[&list[0]].clone()
                }
            };
            let stage_output = txs.remove(&name).expect("one channel per stage");
            self.spawn_stage(
                &mut join_set,
                index,
                stage.clone(),
                token.clone(),
                stage_input,
                stage_output,
                err_tx.clone(),
            );
        }
        drop(err_tx);

        let leaf_channels: Vec<(String, ElementReceiver)> = self
            .leaves
            .iter()
            .map(|name| (name.clone(), rxs[name].clone()))
            .collect();
        let collector = tokio::spawn(collect_leaves(token.clone(), leaf_channels, out_tx));

        let emitter = self.emitter.clone();
        let supervisor_token = token.clone();
        tracker.spawn(async move {
            let mut first_error: Option<PipelineError> = None;
            while let Some(joined) = join_set.join_next().await {
                if let Err(join_err) = joined {
                    if first_error.is_none() && !join_err.is_cancelled() {
                        first_error = Some(PipelineError::Other(format!(
                            "stage task panicked: {join_err}"
                        )));
                    }
                }
            }
            if first_error.is_none() {
                first_error = err_rx.try_recv().ok().map(PipelineError::Stage);
            }
            let _ = collector.await;
            let duration = started.elapsed();
            match first_error {
                None => emit(&emitter, PipelineEvent::PipelineCompleted { duration }),
                Some(err) => emit(
                    &emitter,
                    PipelineEvent::PipelineFailed {
                        error: err.to_string(),
                        duration,
                    },
                ),
            }
            // Releases the timeout monitor once the execution is over.
            supervisor_token.cancel();
        });

        out_rx
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_stage(
        &self,
        join_set: &mut JoinSet<()>,
        index: usize,
        stage: Arc<dyn Stage>,
        token: CancellationToken,
        input: ElementReceiver,
        output: ElementSender,
        err_tx: flume::Sender<StageError>,
    ) {
        let emitter = self.emitter.clone();
        let trace_timings = self.config.enable_tracing;
        join_set.spawn(async move {
            let name = stage.name().to_string();
            let kind = stage.kind();
            emit(
                &emitter,
                PipelineEvent::StageStarted {
                    name: name.clone(),
                    index,
                    kind,
                },
            );
            let stage_started = Instant::now();
            let result = stage.process(token, input, output).await;
            let duration = stage_started.elapsed();
            if trace_timings {
                debug!(stage = %name, ?kind, ?duration, ok = result.is_ok(), "stage finished");
            }
            match result {
                // Deliberate cancellation is not a stage failure.
                Ok(()) | Err(PipelineError::Cancelled) => emit(
                    &emitter,
                    PipelineEvent::StageCompleted {
                        name,
                        index,
                        duration,
                    },
                ),
                Err(err) => {
                    emit(
                        &emitter,
                        PipelineEvent::StageFailed {
                            name: name.clone(),
                            index,
                            error: err.to_string(),
                            duration,
                        },
                    );
                    let _ = err_tx.try_send(StageError::new(name, kind, err));
                }
            }
        });
    }

    fn spawn_timeout_monitor(&self, token: &CancellationToken, stage_count: usize) {
        let timeout = self.config.execution_timeout;
        if timeout.is_zero() {
            return;
        }
        let token = token.clone();
        tokio::spawn(async move {
            let armed = Instant::now();
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    error!(
                        timeout_ms = timeout.as_millis() as u64,
                        elapsed_ms = armed.elapsed().as_millis() as u64,
                        stage_count,
                        "pipeline execution timed out"
                    );
                    token.cancel();
                }
            }
        });
    }
}

/// Drain each leaf channel in stage-list order into the pipeline output.
/// One leaf is fully drained before the next is read; the output channel
/// closes when the collector returns.
async fn collect_leaves(
    token: CancellationToken,
    leaves: Vec<(String, ElementReceiver)>,
    out_tx: ElementSender,
) {
    for (name, rx) in leaves {
        loop {
            match next_element(&token, &rx).await {
                Ok(Some(element)) => match forward(&token, &out_tx, element).await {
                    Ok(true) => {}
                    // Caller dropped the output receiver or we were cancelled:
                    // nothing more can be delivered.
                    Ok(false) | Err(_) => return,
                },
                Ok(None) => {
                    debug!(leaf = %name, "leaf drained");
                    break;
                }
                Err(_) => return,
            }
        }
    }
}
