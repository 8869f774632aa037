//! Frame-rate limiting for video frames and images.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::stage::{forward, next_element, ElementReceiver, ElementSender, Stage, StageKind};

/// Applied when frames arrive faster than the target rate. A policy hint for
/// collaborators; the gate itself always drops the frame that arrived early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropStrategy {
    /// Prefer the most recent frame.
    #[default]
    KeepLatest,
    /// Spread admitted frames evenly.
    Uniform,
}

const DEFAULT_TARGET_FPS: f64 = 30.0;

/// Gates video frames and images to a target frame rate.
///
/// The first frame is always admitted; afterwards a frame passes only when
/// at least `1 / target_fps` has elapsed since the last admitted frame.
/// Audio and non-media elements pass through untouched when the
/// corresponding flag is set, and control elements always pass.
pub struct RateLimitStage {
    name: String,
    target_fps: f64,
    strategy: DropStrategy,
    passthrough_audio: bool,
    passthrough_non_media: bool,
    last_emit: Mutex<Option<Instant>>,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl RateLimitStage {
    /// Create a limiter; a non-positive `target_fps` falls back to the
    /// default of 30.
    pub fn new(name: impl Into<String>, target_fps: f64) -> Self {
        let target_fps = if target_fps > 0.0 {
            target_fps
        } else {
            DEFAULT_TARGET_FPS
        };
        Self {
            name: name.into(),
            target_fps,
            strategy: DropStrategy::default(),
            passthrough_audio: true,
            passthrough_non_media: true,
            last_emit: Mutex::new(None),
            emitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Set the drop-strategy hint.
    pub fn with_strategy(mut self, strategy: DropStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Whether audio elements bypass the gate (default true).
    pub fn with_passthrough_audio(mut self, passthrough: bool) -> Self {
        self.passthrough_audio = passthrough;
        self
    }

    /// Whether non-media elements bypass the gate (default true).
    pub fn with_passthrough_non_media(mut self, passthrough: bool) -> Self {
        self.passthrough_non_media = passthrough;
        self
    }

    /// The configured drop-strategy hint.
    pub fn strategy(&self) -> DropStrategy {
        self.strategy
    }

    /// `(emitted, dropped)` frame counters.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.emitted.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
        )
    }

    fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps)
    }

    /// First-frame admission plus the interval gate.
    fn admit_frame(&self) -> bool {
        let mut last_emit = self.last_emit.lock().unwrap();
        let now = Instant::now();
        match *last_emit {
            None => {
                *last_emit = Some(now);
                true
            }
            Some(prev) => {
                if now.duration_since(prev) >= self.min_interval() {
                    *last_emit = Some(now);
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[async_trait]
impl Stage for RateLimitStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn process(
        &self,
        cancel: CancellationToken,
        input: ElementReceiver,
        output: ElementSender,
    ) -> Result<()> {
        while let Some(element) = next_element(&cancel, &input).await? {
            if element.is_control() {
                if !forward(&cancel, &output, element).await? {
                    break;
                }
                continue;
            }
            if element.is_visual_media() {
                if self.admit_frame() {
                    self.emitted.fetch_add(1, Ordering::Relaxed);
                    if !forward(&cancel, &output, element).await? {
                        break;
                    }
                } else {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                continue;
            }
            let passthrough = if element.is_audio() {
                self.passthrough_audio
            } else {
                self.passthrough_non_media
            };
            if passthrough {
                if !forward(&cancel, &output, element).await? {
                    break;
                }
            } else {
                debug!(stage = %self.name, source = %element.source, "passthrough disabled; element skipped");
            }
        }
        Ok(())
    }
}
