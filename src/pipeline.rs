//! The pipeline value: an immutable stage DAG plus configuration, executed
//! any number of times until shut down.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::PipelineConfig;
use crate::element::StreamElement;
use crate::error::{PipelineError, Result};
use crate::events::EventEmitter;
use crate::executor::Executor;
use crate::stage::{ElementReceiver, Stage};
use crate::types::ExecutionResult;

/// An executable pipeline produced by
/// [`PipelineBuilder::build`](crate::PipelineBuilder::build).
///
/// The graph is immutable after build. [`execute`](Self::execute) may be
/// called any number of times, concurrently, until
/// [`shutdown`](Self::shutdown); in-flight executions are tracked and
/// drained by shutdown.
pub struct Pipeline {
    executor: Executor,
    shutting_down: AtomicBool,
    tracker: TaskTracker,
    sequence: AtomicU64,
}

impl Pipeline {
    pub(crate) fn new(
        stages: Vec<Arc<dyn Stage>>,
        edges: Vec<(String, String)>,
        config: PipelineConfig,
        emitter: Option<Arc<dyn EventEmitter>>,
    ) -> Self {
        let mut upstreams: HashMap<String, Vec<String>> = HashMap::new();
        let mut has_downstream: HashSet<String> = HashSet::new();
        for (from, to) in &edges {
            upstreams.entry(to.clone()).or_default().push(from.clone());
            has_downstream.insert(from.clone());
        }
        let leaves = stages
            .iter()
            .map(|s| s.name().to_string())
            .filter(|name| !has_downstream.contains(name))
            .collect();

        Self {
            executor: Executor {
                stages,
                upstreams,
                leaves,
                config,
                emitter,
            },
            shutting_down: AtomicBool::new(false),
            tracker: TaskTracker::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Number of stages in the DAG.
    pub fn stage_count(&self) -> usize {
        self.executor.stages.len()
    }

    /// Names of the leaf stages (no outgoing edges), in stage-list order.
    /// Their outputs feed the pipeline output channel.
    pub fn leaf_names(&self) -> Vec<&str> {
        self.executor.leaves.iter().map(String::as_str).collect()
    }

    /// The configuration bound at build time.
    pub fn config(&self) -> &PipelineConfig {
        &self.executor.config
    }

    /// Whether `shutdown` has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Next value of the monotone per-pipeline sequence counter.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Start one execution and return its output channel immediately.
    ///
    /// Every stage runs as its own task over `cancel`'s child token; the
    /// caller feeds `input` (and closes it by dropping all senders) and
    /// drains the returned receiver. Leaves are drained sequentially in
    /// stage-list order, so when several leaves are productive their outputs
    /// interleave only at leaf boundaries; add an explicit merge when finer
    /// interleaving matters. The output channel is always closed once the
    /// leaves drain.
    pub fn execute(
        &self,
        cancel: CancellationToken,
        input: ElementReceiver,
    ) -> Result<ElementReceiver> {
        if self.is_shutting_down() {
            return Err(PipelineError::ShuttingDown);
        }
        let token = cancel.child_token();
        Ok(self.executor.launch(token, input, &self.tracker))
    }

    /// Blocking convenience over [`execute`](Self::execute): push the given
    /// elements, close the input, and drain the output into an
    /// [`ExecutionResult`].
    ///
    /// The last `Error` element observed on the output becomes the returned
    /// error.
    pub async fn execute_sync(
        &self,
        cancel: CancellationToken,
        elements: Vec<StreamElement>,
    ) -> Result<ExecutionResult> {
        let started_at = SystemTime::now();
        let started = Instant::now();

        let (in_tx, in_rx) = flume::bounded(elements.len().max(1));
        for element in elements {
            let sequenced = element.with_sequence(self.next_sequence());
            in_tx
                .send(sequenced)
                .map_err(|_| PipelineError::Other("pipeline input rejected".to_string()))?;
        }
        drop(in_tx);

        let out_rx = self.execute(cancel, in_rx)?;
        let mut collected = Vec::new();
        while let Ok(element) = out_rx.recv_async().await {
            collected.push(element);
        }

        let last_error = collected
            .iter()
            .rev()
            .find_map(|e| match &e.payload {
                crate::element::ElementPayload::Error(err) => Some(err.clone()),
                _ => None,
            });
        if let Some(err) = last_error {
            return Err(PipelineError::Stream(err));
        }

        Ok(ExecutionResult::from_elements(
            collected,
            started_at,
            SystemTime::now(),
            started.elapsed(),
        ))
    }

    /// Begin shutdown: refuse new executions and wait for in-flight ones.
    ///
    /// Idempotent -- the second and later calls return `Ok(())` immediately.
    /// Waits until the in-flight executions drain or the configured
    /// graceful-shutdown timeout (intersected with `cancel`) elapses, in
    /// which case [`PipelineError::ShutdownTimeout`] is returned. A zero
    /// graceful-shutdown timeout waits indefinitely.
    pub async fn shutdown(&self, cancel: CancellationToken) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.tracker.close();

        let grace = self.executor.config.graceful_shutdown_timeout;
        tokio::select! {
            _ = self.tracker.wait() => Ok(()),
            _ = cancel.cancelled() => Err(PipelineError::ShutdownTimeout),
            _ = deadline(grace) => Err(PipelineError::ShutdownTimeout),
        }
    }
}

async fn deadline(grace: std::time::Duration) {
    if grace.is_zero() {
        std::future::pending::<()>().await;
    } else {
        tokio::time::sleep(grace).await;
    }
}
