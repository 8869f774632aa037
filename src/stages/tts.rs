//! Speech synthesis for outbound text.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::element::{ElementPayload, StreamElement};
use crate::error::Result;
use crate::media::AudioData;
use crate::message::Role;
use crate::provider::SpeechSynthesizer;
use crate::stage::{forward, next_element, ElementReceiver, ElementSender, Stage, StageKind};

/// Synthesizes audio for assistant messages and text elements.
///
/// Successful synthesis replaces the element with an `Audio` element carrying
/// the spoken bytes. On synthesis failure the stage emits an `Error` element,
/// passes the original element through unchanged, and keeps processing --
/// losing a voice is not a reason to lose the text. Everything else is
/// forwarded untouched.
pub struct TtsStage {
    name: String,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sample_rate: u32,
}

impl TtsStage {
    pub fn new(name: impl Into<String>, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            name: name.into(),
            synthesizer,
            sample_rate: 24_000,
        }
    }

    /// Sample rate stamped on the produced audio elements.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    fn speakable_text(element: &StreamElement) -> Option<&str> {
        match &element.payload {
            ElementPayload::Text(text) => Some(text),
            ElementPayload::Message(m) if m.role == Role::Assistant => Some(&m.content),
            _ => None,
        }
    }
}

#[async_trait]
impl Stage for TtsStage {
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
            let text = match Self::speakable_text(&element) {
                Some(text) => text,
                None => {
                    if !forward(&cancel, &output, element).await? {
                        break;
                    }
                    continue;
                }
            };

            match self.synthesizer.synthesize(&cancel, text).await {
                Ok(bytes) => {
                    let mut audio = AudioData::pcm16(bytes, self.sample_rate, 1);
                    audio.encoding = Some(self.synthesizer.mime_type().to_string());
                    let spoken = StreamElement::audio(audio).with_source(self.name.clone());
                    if !forward(&cancel, &output, spoken).await? {
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        stage = %self.name,
                        synthesizer = self.synthesizer.name(),
                        error = %err,
                        "synthesis failed; passing text through"
                    );
                    let error_elem =
                        StreamElement::error(err).with_source(self.name.clone());
                    if !forward(&cancel, &output, error_elem).await? {
                        break;
                    }
                    if !forward(&cancel, &output, element).await? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::provider::MockSpeechSynthesizer;

    async fn run(stage: &TtsStage, elements: Vec<StreamElement>) -> Vec<StreamElement> {
        let (in_tx, in_rx) = flume::bounded(elements.len().max(1));
        for elem in elements {
            in_tx.send(elem).unwrap();
        }
        drop(in_tx);
        let (out_tx, out_rx) = flume::bounded(16);
        stage
            .process(CancellationToken::new(), in_rx, out_tx)
            .await
            .unwrap();
        out_rx.into_iter().collect()
    }

    #[tokio::test]
    async fn test_assistant_message_becomes_audio() {
        let stage = TtsStage::new("tts", Arc::new(MockSpeechSynthesizer::new()));
        let out = run(
            &stage,
            vec![StreamElement::message(Message::assistant("say this"))],
        )
        .await;
        assert_eq!(out.len(), 1);
        let audio = out[0].as_audio().expect("audio element");
        assert_eq!(audio.sample_rate, 24_000);
        assert!(!audio.data.is_empty());
        assert_eq!(out[0].source, "tts");
    }

    #[tokio::test]
    async fn test_user_message_not_spoken() {
        let stage = TtsStage::new("tts", Arc::new(MockSpeechSynthesizer::new()));
        let out = run(
            &stage,
            vec![StreamElement::message(Message::user("not mine to say"))],
        )
        .await;
        assert_eq!(out.len(), 1);
        assert!(out[0].as_message().is_some());
    }

    #[tokio::test]
    async fn test_failure_passes_text_through_with_error() {
        let stage = TtsStage::new("tts", Arc::new(MockSpeechSynthesizer::failing()));
        let out = run(
            &stage,
            vec![
                StreamElement::text("unspoken"),
                StreamElement::text("still processed"),
            ],
        )
        .await;
        // Per input: one error element plus the original.
        assert_eq!(out.len(), 4);
        assert!(out[0].is_error());
        assert_eq!(out[1].as_text(), Some("unspoken"));
        assert!(out[2].is_error());
        assert_eq!(out[3].as_text(), Some("still processed"));
    }

    #[tokio::test]
    async fn test_control_elements_forwarded() {
        let stage = TtsStage::new("tts", Arc::new(MockSpeechSynthesizer::new()));
        let out = run(&stage, vec![StreamElement::end_of_stream()]).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].is_end_of_stream());
    }
}
