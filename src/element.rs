//! The stream element model.
//!
//! A [`StreamElement`] is the unit of traffic on every inter-stage channel:
//! a tagged payload (at most one of text, message, audio, video, image, tool
//! call, error, end-of-stream) inside a uniform envelope of metadata, source,
//! sequence, priority, and timestamp.
//!
//! Elements are plain owned values. Cloning is shallow (media bodies are
//! [`bytes::Bytes`]) and payloads are treated as immutable by downstream
//! stages; a stage that wants to change a payload builds a fresh element via
//! [`StreamElement::with_payload`] rather than mutating in place.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::PipelineError;
use crate::media::{AudioData, ImageData, VideoFrame};
use crate::message::{Message, ToolCall};

/// Advisory delivery priority. The runtime never reorders by priority; the
/// field is metadata for consumers that do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// The primary payload of a stream element. Exactly one variant per element;
/// `Error` and `EndOfStream` are control markers with no data payload.
#[derive(Debug, Clone)]
pub enum ElementPayload {
    /// Plain text, e.g. a token or a transcript fragment.
    Text(String),
    /// A structured chat message.
    Message(Message),
    /// An audio chunk.
    Audio(AudioData),
    /// A video frame.
    Video(VideoFrame),
    /// A still image.
    Image(ImageData),
    /// A tool invocation request.
    ToolCall(ToolCall),
    /// An in-band error; routers and rate limiters forward it unchanged.
    Error(Arc<PipelineError>),
    /// End-of-stream marker; never combined with a data payload.
    EndOfStream,
}

impl ElementPayload {
    /// Default priority for this payload variant.
    fn default_priority(&self) -> Priority {
        match self {
            ElementPayload::EndOfStream => Priority::Critical,
            ElementPayload::Audio(_) | ElementPayload::Video(_) => Priority::High,
            _ => Priority::Normal,
        }
    }
}

/// A single element on a pipeline channel.
#[derive(Debug, Clone)]
pub struct StreamElement {
    /// The tagged payload.
    pub payload: ElementPayload,
    /// Free-form metadata; starts empty, never absent.
    pub metadata: HashMap<String, Value>,
    /// Name of the producing stage (empty for caller-supplied input).
    pub source: String,
    /// Monotone per-pipeline sequence number, advisory.
    pub sequence: u64,
    /// Advisory priority.
    pub priority: Priority,
    /// Creation timestamp.
    pub timestamp: SystemTime,
}

impl StreamElement {
    /// Create an element with the variant's default priority and an empty
    /// metadata map.
    pub fn new(payload: ElementPayload) -> Self {
        let priority = payload.default_priority();
        Self {
            payload,
            metadata: HashMap::new(),
            source: String::new(),
            sequence: 0,
            priority,
            timestamp: SystemTime::now(),
        }
    }

    /// A text element.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(ElementPayload::Text(text.into()))
    }

    /// A message element.
    pub fn message(message: Message) -> Self {
        Self::new(ElementPayload::Message(message))
    }

    /// An audio element (priority `High`).
    pub fn audio(audio: AudioData) -> Self {
        Self::new(ElementPayload::Audio(audio))
    }

    /// A video element (priority `High`).
    pub fn video(frame: VideoFrame) -> Self {
        Self::new(ElementPayload::Video(frame))
    }

    /// An image element.
    pub fn image(image: ImageData) -> Self {
        Self::new(ElementPayload::Image(image))
    }

    /// A tool-call element.
    pub fn tool_call(call: ToolCall) -> Self {
        Self::new(ElementPayload::ToolCall(call))
    }

    /// An in-band error element.
    pub fn error(err: PipelineError) -> Self {
        Self::new(ElementPayload::Error(Arc::new(err)))
    }

    /// An end-of-stream marker (priority `Critical`).
    pub fn end_of_stream() -> Self {
        Self::new(ElementPayload::EndOfStream)
    }

    /// Replace the payload, keeping the envelope.
    ///
    /// This is the supported way to "mutate" an element: the stage gets a
    /// fresh element that shares no storage with anything it retained.
    pub fn with_payload(mut self, payload: ElementPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Set the producing stage name.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the sequence number.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Override the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Insert a metadata entry (builder style).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Insert a metadata entry in place.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Look up a metadata entry.
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Whether this is the end-of-stream marker.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self.payload, ElementPayload::EndOfStream)
    }

    /// Whether this is an in-band error.
    pub fn is_error(&self) -> bool {
        matches!(self.payload, ElementPayload::Error(_))
    }

    /// Whether this is a control marker (`Error` or `EndOfStream`).
    pub fn is_control(&self) -> bool {
        self.is_error() || self.is_end_of_stream()
    }

    /// Whether this is a frame the rate limiter gates (video or image).
    pub fn is_visual_media(&self) -> bool {
        matches!(
            self.payload,
            ElementPayload::Video(_) | ElementPayload::Image(_)
        )
    }

    /// Whether this is an audio chunk.
    pub fn is_audio(&self) -> bool {
        matches!(self.payload, ElementPayload::Audio(_))
    }

    /// The message payload, if this is a message element.
    pub fn as_message(&self) -> Option<&Message> {
        match &self.payload {
            ElementPayload::Message(m) => Some(m),
            _ => None,
        }
    }

    /// The text payload, if this is a text element.
    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            ElementPayload::Text(t) => Some(t),
            _ => None,
        }
    }

    /// The audio payload, if this is an audio element.
    pub fn as_audio(&self) -> Option<&AudioData> {
        match &self.payload {
            ElementPayload::Audio(a) => Some(a),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_priorities() {
        assert_eq!(StreamElement::end_of_stream().priority, Priority::Critical);
        assert_eq!(
            StreamElement::audio(AudioData::pcm16(vec![0u8; 4], 16_000, 1)).priority,
            Priority::High
        );
        assert_eq!(
            StreamElement::video(VideoFrame::new(vec![0u8; 4], "image/jpeg", 2, 2)).priority,
            Priority::High
        );
        assert_eq!(StreamElement::text("hi").priority, Priority::Normal);
        assert_eq!(
            StreamElement::image(ImageData::new(vec![0u8; 4], "image/png", 2, 2)).priority,
            Priority::Normal
        );
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_metadata_starts_empty_and_initializes_on_write() {
        let mut elem = StreamElement::text("x");
        assert!(elem.metadata.is_empty());
        elem.set_metadata("k", "v");
        assert_eq!(elem.metadata_value("k").and_then(|v| v.as_str()), Some("v"));
    }

    #[test]
    fn test_control_predicates() {
        assert!(StreamElement::end_of_stream().is_control());
        assert!(StreamElement::error(PipelineError::Cancelled).is_control());
        assert!(!StreamElement::text("x").is_control());
    }

    #[test]
    fn test_eos_carries_no_data_payload() {
        let eos = StreamElement::end_of_stream().with_metadata("reason", "drained");
        assert!(eos.is_end_of_stream());
        assert!(eos.as_message().is_none());
        assert!(eos.as_text().is_none());
        // The envelope still carries metadata.
        assert_eq!(
            eos.metadata_value("reason").and_then(|v| v.as_str()),
            Some("drained")
        );
    }

    #[test]
    fn test_with_payload_replaces_keeping_envelope() {
        let elem = StreamElement::text("original")
            .with_source("mapper")
            .with_sequence(7)
            .with_metadata("key", 1);
        let replaced = elem.with_payload(ElementPayload::Text("changed".to_string()));
        assert_eq!(replaced.as_text(), Some("changed"));
        assert_eq!(replaced.source, "mapper");
        assert_eq!(replaced.sequence, 7);
        assert_eq!(replaced.metadata_value("key").and_then(|v| v.as_i64()), Some(1));
    }

    #[test]
    fn test_retained_clone_is_isolated_from_later_mutation() {
        // Regression shape for the retained-element aliasing bug: a stage
        // that buffers an element must hold an owned copy that later
        // traffic cannot corrupt.
        let mut incoming = StreamElement::end_of_stream().with_metadata("turn", 1);
        let retained = incoming.clone();
        incoming.set_metadata("turn", 2);
        incoming.source = "overwritten".to_string();
        assert_eq!(
            retained.metadata_value("turn").and_then(|v| v.as_i64()),
            Some(1)
        );
        assert_eq!(retained.source, "");
    }
}
