//! Mock collaborators for testing without live speech or embedding services.
//!
//! Each mock returns pre-configured results in order, cycling when exhausted,
//! so downstream consumers can write deterministic tests against this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::{EmbeddingProvider, SpeechSynthesizer, Transcriber, VadAnalyzer};
use crate::error::{PipelineError, Result};
use crate::media::AudioData;

/// A transcriber that returns canned transcripts in order.
///
/// Cycles back to the beginning when all transcripts have been consumed.
#[derive(Debug)]
pub struct MockTranscriber {
    transcripts: Vec<String>,
    index: AtomicUsize,
    bytes_seen: AtomicUsize,
}

impl MockTranscriber {
    /// Create a mock with the given canned transcripts.
    pub fn new(transcripts: Vec<String>) -> Self {
        assert!(
            !transcripts.is_empty(),
            "MockTranscriber requires at least one transcript"
        );
        Self {
            transcripts,
            index: AtomicUsize::new(0),
            bytes_seen: AtomicUsize::new(0),
        }
    }

    /// Create a mock that always returns the same transcript.
    pub fn fixed(transcript: impl Into<String>) -> Self {
        Self::new(vec![transcript.into()])
    }

    /// Total audio bytes passed through `transcribe`.
    pub fn bytes_seen(&self) -> usize {
        self.bytes_seen.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _cancel: &CancellationToken, audio: &AudioData) -> Result<String> {
        self.bytes_seen.fetch_add(audio.data.len(), Ordering::Relaxed);
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.transcripts.len();
        Ok(self.transcripts[idx].clone())
    }

    fn name(&self) -> &'static str {
        "mock-transcriber"
    }
}

/// A transcriber that always fails, for error-path tests.
#[derive(Debug, Default)]
pub struct FailingTranscriber;

#[async_trait]
impl Transcriber for FailingTranscriber {
    async fn transcribe(&self, _cancel: &CancellationToken, _audio: &AudioData) -> Result<String> {
        Err(PipelineError::Other("transcription unavailable".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing-transcriber"
    }
}

/// A synthesizer that returns a fixed byte pattern per request.
#[derive(Debug)]
pub struct MockSpeechSynthesizer {
    /// Bytes produced per character of input text.
    bytes_per_char: usize,
    fail: bool,
}

impl MockSpeechSynthesizer {
    pub fn new() -> Self {
        Self {
            bytes_per_char: 4,
            fail: false,
        }
    }

    /// Create a synthesizer that fails every request.
    pub fn failing() -> Self {
        Self {
            bytes_per_char: 0,
            fail: true,
        }
    }
}

impl Default for MockSpeechSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSpeechSynthesizer {
    async fn synthesize(&self, _cancel: &CancellationToken, text: &str) -> Result<Bytes> {
        if self.fail {
            return Err(PipelineError::Other("synthesis unavailable".to_string()));
        }
        Ok(Bytes::from(vec![0u8; text.len() * self.bytes_per_char]))
    }

    fn mime_type(&self) -> &'static str {
        "audio/pcm"
    }

    fn name(&self) -> &'static str {
        "mock-tts"
    }
}

/// A VAD analyser that replays a scripted score sequence.
///
/// Returns the last score once the script is exhausted; `reset` rewinds to
/// the beginning.
#[derive(Debug)]
pub struct MockVadAnalyzer {
    scores: Vec<f32>,
    index: AtomicUsize,
    chunks_seen: AtomicUsize,
}

impl MockVadAnalyzer {
    pub fn new(scores: Vec<f32>) -> Self {
        assert!(!scores.is_empty(), "MockVadAnalyzer requires at least one score");
        Self {
            scores,
            index: AtomicUsize::new(0),
            chunks_seen: AtomicUsize::new(0),
        }
    }

    /// A mock that scores every chunk identically.
    pub fn fixed(score: f32) -> Self {
        Self::new(vec![score])
    }

    /// Number of chunks analysed so far.
    pub fn chunks_seen(&self) -> usize {
        self.chunks_seen.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl VadAnalyzer for MockVadAnalyzer {
    async fn analyze(&self, _cancel: &CancellationToken, _chunk: &[u8]) -> Result<f32> {
        self.chunks_seen.fetch_add(1, Ordering::Relaxed);
        let idx = self.index.fetch_add(1, Ordering::Relaxed);
        Ok(self.scores[idx.min(self.scores.len() - 1)])
    }

    fn reset(&self) {
        self.index.store(0, Ordering::Relaxed);
    }

    fn name(&self) -> &'static str {
        "mock-vad"
    }
}

/// An embedding provider with deterministic, hand-settable vectors.
///
/// Texts are matched by exact content; unknown texts embed to the zero
/// vector. A `fail` flag turns every call into an error for fallback tests.
pub struct MockEmbeddingProvider {
    dimensions: usize,
    vectors: Mutex<Vec<(String, Vec<f32>)>>,
    fail: bool,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// Create a provider that fails every call.
    pub fn failing() -> Self {
        Self {
            dimensions: 3,
            vectors: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Register the vector returned for an exact text.
    pub fn with_vector(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), self.dimensions, "vector dimensionality mismatch");
        self.vectors.lock().unwrap().push((text.into(), vector));
        self
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, _cancel: &CancellationToken, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(PipelineError::Other("embedding unavailable".to_string()));
        }
        let vectors = self.vectors.lock().unwrap();
        Ok(texts
            .iter()
            .map(|t| {
                vectors
                    .iter()
                    .find(|(text, _)| text == t)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| vec![0.0; self.dimensions])
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(len: usize) -> AudioData {
        AudioData::pcm16(vec![0u8; len], 16_000, 1)
    }

    #[tokio::test]
    async fn test_mock_transcriber_cycles() {
        let mock = MockTranscriber::new(vec!["first".into(), "second".into()]);
        let cancel = CancellationToken::new();
        assert_eq!(mock.transcribe(&cancel, &chunk(10)).await.unwrap(), "first");
        assert_eq!(mock.transcribe(&cancel, &chunk(10)).await.unwrap(), "second");
        assert_eq!(mock.transcribe(&cancel, &chunk(10)).await.unwrap(), "first");
        assert_eq!(mock.bytes_seen(), 30);
    }

    #[tokio::test]
    async fn test_mock_vad_replays_script_then_holds() {
        let mock = MockVadAnalyzer::new(vec![0.9, 0.2]);
        let cancel = CancellationToken::new();
        assert_eq!(mock.analyze(&cancel, &[0u8; 4]).await.unwrap(), 0.9);
        assert_eq!(mock.analyze(&cancel, &[0u8; 4]).await.unwrap(), 0.2);
        assert_eq!(mock.analyze(&cancel, &[0u8; 4]).await.unwrap(), 0.2);
        mock.reset();
        assert_eq!(mock.analyze(&cancel, &[0u8; 4]).await.unwrap(), 0.9);
        assert_eq!(mock.chunks_seen(), 4);
    }

    #[tokio::test]
    async fn test_mock_tts_scales_with_text() {
        let mock = MockSpeechSynthesizer::new();
        let cancel = CancellationToken::new();
        let audio = mock.synthesize(&cancel, "hello").await.unwrap();
        assert_eq!(audio.len(), 20);
        assert_eq!(mock.mime_type(), "audio/pcm");
    }

    #[tokio::test]
    async fn test_mock_embeddings_match_by_text() {
        let mock = MockEmbeddingProvider::new(3)
            .with_vector("hello", vec![1.0, 0.0, 0.0])
            .with_vector("world", vec![0.0, 1.0, 0.0]);
        let cancel = CancellationToken::new();
        let out = mock
            .embed(&cancel, &["world".to_string(), "unknown".to_string()])
            .await
            .unwrap();
        assert_eq!(out[0], vec![0.0, 1.0, 0.0]);
        assert_eq!(out[1], vec![0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_failing_mocks_fail() {
        let cancel = CancellationToken::new();
        assert!(FailingTranscriber
            .transcribe(&cancel, &chunk(4))
            .await
            .is_err());
        assert!(MockSpeechSynthesizer::failing()
            .synthesize(&cancel, "x")
            .await
            .is_err());
        assert!(MockEmbeddingProvider::failing()
            .embed(&cancel, &["x".to_string()])
            .await
            .is_err());
    }
}
