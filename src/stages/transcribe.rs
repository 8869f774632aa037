//! Per-chunk speech-to-text, the non-VAD transcription path.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::element::{ElementPayload, StreamElement};
use crate::error::Result;
use crate::message::{Message, Role};
use crate::provider::Transcriber;
use crate::stage::{forward, next_element, ElementReceiver, ElementSender, Stage, StageKind};

/// Transcribes each audio element into a user message.
///
/// Use this when upstream already segments utterances (one audio element per
/// turn); for raw microphone chunks, use
/// [`VadAccumulatorStage`](crate::stages::VadAccumulatorStage) instead.
/// Transcription failures surface as `Error` elements and processing
/// continues; empty transcriptions are skipped. Non-audio elements pass
/// through unchanged.
pub struct TranscriptionStage {
    name: String,
    transcriber: Arc<dyn Transcriber>,
}

impl TranscriptionStage {
    pub fn new(name: impl Into<String>, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            name: name.into(),
            transcriber,
        }
    }
}

#[async_trait]
impl Stage for TranscriptionStage {
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
            let audio = match &element.payload {
                ElementPayload::Audio(audio) => audio,
                _ => {
                    if !forward(&cancel, &output, element).await? {
                        break;
                    }
                    continue;
                }
            };

            match self.transcriber.transcribe(&cancel, audio).await {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => {
                    let message = Message::new(Role::User, text)
                        .with_source_tag(self.transcriber.name());
                    let transcribed =
                        StreamElement::message(message).with_source(self.name.clone());
                    if !forward(&cancel, &output, transcribed).await? {
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        stage = %self.name,
                        transcriber = self.transcriber.name(),
                        error = %err,
                        "transcription failed for one chunk"
                    );
                    let error_elem =
                        StreamElement::error(err).with_source(self.name.clone());
                    if !forward(&cancel, &output, error_elem).await? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
