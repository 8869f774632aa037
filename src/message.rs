//! Structured chat messages exchanged through the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::SystemTime;

use crate::media::{AudioData, ImageData};

/// Author of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One part of a multimodal message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePart {
    /// Plain text.
    Text(String),
    /// An inline image.
    Image(ImageData),
    /// An inline audio clip.
    Audio(AudioData),
}

/// A request by the model to invoke a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back in the tool result.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Arguments as a JSON value.
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of one validation applied to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Validator name.
    pub name: String,
    /// Whether the message passed.
    pub passed: bool,
    /// Optional detail, populated on failure.
    pub detail: Option<String>,
}

/// A structured chat message.
///
/// `content` is the canonical flat text; `parts` carries the multimodal
/// breakdown when one exists. Stages that only care about text read
/// `content` and ignore `parts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message author.
    pub role: Role,
    /// Flat text content.
    pub content: String,
    /// Multimodal parts, possibly empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
    /// Tool calls requested by this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Result of a prior tool call, for `Role::Tool` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<Value>,
    /// Validations applied to this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<ValidationRecord>,
    /// Creation timestamp.
    pub timestamp: SystemTime,
    /// Generation latency in milliseconds, when measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Tag identifying the producer (e.g. a provider or stage name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tag: Option<String>,
}

impl Message {
    /// Create a message with flat text content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            role,
            content,
            parts: Vec::new(),
            tool_calls: Vec::new(),
            tool_result: None,
            validations: Vec::new(),
            timestamp: SystemTime::now(),
            latency_ms: None,
            source_tag: None,
        }
    }

    /// Shorthand for a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Shorthand for an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Shorthand for a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Append a part to the multimodal body.
    pub fn with_part(mut self, part: MessagePart) -> Self {
        self.parts.push(part);
        self
    }

    /// Attach a tool call.
    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// Record the generation latency.
    pub fn with_latency_ms(mut self, latency: u64) -> Self {
        self.latency_ms = Some(latency);
        self
    }

    /// Tag the producer.
    pub fn with_source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = Some(tag.into());
        self
    }
}
