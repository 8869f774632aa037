//! Turn-boundary detection: accumulate user audio until silence or a
//! duration cap, then transcribe the turn into a single message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::element::{ElementPayload, StreamElement};
use crate::error::{PipelineError, Result};
use crate::media::AudioData;
use crate::message::{Message, MessagePart, Role};
use crate::provider::{Transcriber, VadAnalyzer};
use crate::stage::{forward, next_element, ElementReceiver, ElementSender, Stage, StageKind};

/// Tuning for the speech/silence state machine.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Speech probability at or above which a chunk counts as speech.
    pub threshold: f32,
    /// Silence run that completes a turn once speech was detected.
    pub silence_duration: Duration,
    /// Minimum speech run before silence may complete the turn. Advisory:
    /// the max-turn and input-close paths ignore it.
    pub min_speech_duration: Duration,
    /// Hard cap on turn length.
    pub max_turn_duration: Duration,
    /// Sample rate of the accumulated PCM handed to the transcriber.
    pub sample_rate: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            silence_duration: Duration::from_millis(700),
            min_speech_duration: Duration::from_millis(100),
            max_turn_duration: Duration::from_secs(30),
            sample_rate: 16_000,
        }
    }
}

/// Accumulates audio chunks into a user turn.
///
/// Each chunk is appended to the turn buffer and scored by the VAD
/// analyser. A score at or above the threshold marks speech and clears any
/// silence run; below it, a silence run starts once speech has been heard.
/// The turn completes when the silence run reaches `silence_duration` (with
/// at least `min_speech_duration` of speech before it) or when the turn
/// exceeds `max_turn_duration`. On completion -- or when the input closes
/// with a non-empty buffer -- the buffer is transcribed and a single user
/// message is emitted, and the stage terminates.
///
/// Non-audio elements are forwarded unchanged. Transcription failures and
/// empty transcriptions surface as an `Error` element and terminate the
/// stage with an error.
pub struct VadAccumulatorStage {
    name: String,
    config: VadConfig,
    analyzer: Arc<dyn VadAnalyzer>,
    transcriber: Arc<dyn Transcriber>,
}

impl VadAccumulatorStage {
    pub fn new(
        name: impl Into<String>,
        analyzer: Arc<dyn VadAnalyzer>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self {
            name: name.into(),
            config: VadConfig::default(),
            analyzer,
            transcriber,
        }
    }

    /// Replace the default tuning.
    pub fn with_config(mut self, config: VadConfig) -> Self {
        self.config = config;
        self
    }

    async fn finish_turn(
        &self,
        cancel: &CancellationToken,
        output: &ElementSender,
        buffer: Vec<u8>,
    ) -> Result<()> {
        let audio = AudioData::pcm16(buffer, self.config.sample_rate, 1);
        let transcribed = self.transcriber.transcribe(cancel, &audio).await;
        let text = match transcribed {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                return self
                    .fail_turn(
                        cancel,
                        output,
                        PipelineError::Other("transcription produced no text".to_string()),
                    )
                    .await;
            }
            Err(err) => return self.fail_turn(cancel, output, err).await,
        };

        let message = Message::new(Role::User, text.clone())
            .with_part(MessagePart::Text(text))
            .with_source_tag(self.transcriber.name());
        let element = StreamElement::message(message).with_source(self.name.clone());
        let _ = forward(cancel, output, element).await?;
        Ok(())
    }

    async fn fail_turn(
        &self,
        cancel: &CancellationToken,
        output: &ElementSender,
        err: PipelineError,
    ) -> Result<()> {
        let shared = Arc::new(err);
        let element = StreamElement::new(ElementPayload::Error(shared.clone()))
            .with_source(self.name.clone());
        let _ = forward(cancel, output, element).await?;
        Err(PipelineError::Stream(shared))
    }
}

#[async_trait]
impl Stage for VadAccumulatorStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Accumulate
    }

    async fn process(
        &self,
        cancel: CancellationToken,
        input: ElementReceiver,
        output: ElementSender,
    ) -> Result<()> {
        let mut buffer: Vec<u8> = Vec::new();
        let mut speech_detected = false;
        let mut silence_start: Option<Instant> = None;
        let turn_start = Instant::now();
        self.analyzer.reset();

        while let Some(element) = next_element(&cancel, &input).await? {
            let audio = match &element.payload {
                ElementPayload::Audio(audio) => audio,
                _ => {
                    if !forward(&cancel, &output, element).await? {
                        return Ok(());
                    }
                    continue;
                }
            };

            buffer.extend_from_slice(&audio.data);
            let score = self.analyzer.analyze(&cancel, &audio.data).await?;
            if score >= self.config.threshold {
                speech_detected = true;
                silence_start = None;
            } else if speech_detected && silence_start.is_none() {
                silence_start = Some(Instant::now());
            }

            let silence_complete = speech_detected
                && silence_start.is_some_and(|silence| {
                    silence.elapsed() >= self.config.silence_duration
                        && silence.duration_since(turn_start) >= self.config.min_speech_duration
                });
            let turn_capped = turn_start.elapsed() >= self.config.max_turn_duration;

            if silence_complete || turn_capped {
                debug!(
                    stage = %self.name,
                    buffered = buffer.len(),
                    capped = turn_capped,
                    "turn complete"
                );
                return self.finish_turn(&cancel, &output, buffer).await;
            }
        }

        if !buffer.is_empty() {
            return self.finish_turn(&cancel, &output, buffer).await;
        }
        Ok(())
    }
}
