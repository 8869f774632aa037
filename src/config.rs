//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PipelineError, Result};

/// Configuration bound to a pipeline at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Buffer depth for every inter-stage channel.
    pub channel_buffer_size: usize,
    /// Advisory cap on concurrent executions, reported to callers. The core
    /// does not enforce it.
    pub max_concurrent_pipelines: Option<usize>,
    /// Wall-clock cap for one execution. `Duration::ZERO` disables the cap.
    pub execution_timeout: Duration,
    /// How long `shutdown` waits for in-flight executions to drain.
    pub graceful_shutdown_timeout: Duration,
    /// Emit stage-level timing events through the event emitter.
    pub enable_tracing: bool,
    /// Advisory flag surfaced to collaborators.
    pub enable_metrics: bool,
    /// Advisory flag surfaced to collaborators.
    pub priority_queue: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 16,
            max_concurrent_pipelines: None,
            execution_timeout: Duration::ZERO,
            graceful_shutdown_timeout: Duration::from_secs(30),
            enable_tracing: false,
            enable_metrics: false,
            priority_queue: false,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-channel buffer depth.
    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }

    /// Set the advisory concurrent-execution cap.
    pub fn with_max_concurrent_pipelines(mut self, max: usize) -> Self {
        self.max_concurrent_pipelines = Some(max);
        self
    }

    /// Set the execution timeout. `Duration::ZERO` disables it.
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Set the graceful shutdown timeout.
    pub fn with_graceful_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_shutdown_timeout = timeout;
        self
    }

    /// Enable stage-level timing events.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Surface the metrics flag to collaborators.
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    /// Surface the priority-queue flag to collaborators.
    pub fn with_priority_queue(mut self, enabled: bool) -> Self {
        self.priority_queue = enabled;
        self
    }

    /// Validate the configuration at build time.
    ///
    /// A zero channel buffer is the unsigned analogue of the negative buffer
    /// sizes the validation exists to reject.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.channel_buffer_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "channel_buffer_size must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_pipelines == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "max_concurrent_pipelines must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}
