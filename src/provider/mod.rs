//! Collaborator interfaces consumed by stages.
//!
//! The runtime never ships concrete speech/LLM/embedding clients; stages hold
//! these traits behind `Arc` and callers inject implementations at
//! construction time. Deterministic in-tree mocks live in [`mock`] so
//! downstream consumers can write tests against this crate.

pub mod mock;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::media::AudioData;
use crate::message::Message;

pub use mock::{
    FailingTranscriber, MockEmbeddingProvider, MockSpeechSynthesizer, MockTranscriber,
    MockVadAnalyzer,
};

/// Speech-to-text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio buffer to text.
    async fn transcribe(&self, cancel: &CancellationToken, audio: &AudioData) -> Result<String>;

    /// Stable identifier for logging.
    fn name(&self) -> &'static str;
}

/// Text-to-speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize audio for the given text.
    async fn synthesize(&self, cancel: &CancellationToken, text: &str) -> Result<Bytes>;

    /// MIME type of the synthesized audio (e.g. `"audio/pcm"`).
    fn mime_type(&self) -> &'static str;

    /// Stable identifier for logging.
    fn name(&self) -> &'static str;
}

/// Voice-activity detection over audio chunks.
#[async_trait]
pub trait VadAnalyzer: Send + Sync {
    /// Score one chunk of audio; the result is a speech probability in
    /// `[0, 1]`.
    async fn analyze(&self, cancel: &CancellationToken, chunk: &[u8]) -> Result<f32>;

    /// Reset any internal state between turns.
    fn reset(&self);

    /// Stable identifier for logging.
    fn name(&self) -> &'static str;
}

/// Text embeddings for relevance scoring.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts. The result has one vector per input, each of
    /// [`dimensions`](Self::dimensions) length.
    async fn embed(&self, cancel: &CancellationToken, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> usize;

    /// Largest batch one `embed` call accepts.
    fn max_batch_size(&self) -> usize;
}

/// Conversation summarization, used by the `Summarize` truncation strategy.
/// The core only references the trait; implementations live with the
/// conversation store.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize a message window into a single replacement text.
    async fn summarize(&self, cancel: &CancellationToken, messages: &[Message]) -> Result<String>;
}
