//! Aggregate result types for blocking execution.

use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use crate::element::StreamElement;
use crate::message::{Message, Role};

/// Everything observed while draining one blocking execution.
///
/// Produced by [`Pipeline::execute_sync`](crate::Pipeline::execute_sync).
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Every output element, in arrival order.
    pub elements: Vec<StreamElement>,
    /// The message payloads, in arrival order.
    pub messages: Vec<Message>,
    /// The last assistant message, as the canonical response.
    pub response: Option<Message>,
    /// Union of all output elements' metadata; later elements win.
    pub metadata: HashMap<String, Value>,
    /// When the execution started.
    pub started_at: SystemTime,
    /// When the output channel closed.
    pub finished_at: SystemTime,
    /// Wall-clock duration of the execution.
    pub duration: Duration,
}

impl ExecutionResult {
    pub(crate) fn from_elements(
        elements: Vec<StreamElement>,
        started_at: SystemTime,
        finished_at: SystemTime,
        duration: Duration,
    ) -> Self {
        let messages: Vec<Message> = elements
            .iter()
            .filter_map(|e| e.as_message().cloned())
            .collect();
        let response = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .cloned();
        let mut metadata = HashMap::new();
        for elem in &elements {
            for (key, value) in &elem.metadata {
                metadata.insert(key.clone(), value.clone());
            }
        }
        Self {
            elements,
            messages,
            response,
            metadata,
            started_at,
            finished_at,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_result_extracts_messages_and_response() {
        let now = SystemTime::now();
        let elements = vec![
            StreamElement::message(Message::user("question")),
            StreamElement::text("interleaved"),
            StreamElement::message(Message::assistant("first answer")),
            StreamElement::message(Message::assistant("final answer")),
        ];
        let result =
            ExecutionResult::from_elements(elements, now, now, Duration::from_millis(5));
        assert_eq!(result.messages.len(), 3);
        assert_eq!(result.response.unwrap().content, "final answer");
    }

    #[test]
    fn test_result_merges_metadata_later_wins() {
        let now = SystemTime::now();
        let elements = vec![
            StreamElement::text("a").with_metadata("shared", 1).with_metadata("only_a", true),
            StreamElement::text("b").with_metadata("shared", 2),
        ];
        let result =
            ExecutionResult::from_elements(elements, now, now, Duration::ZERO);
        assert_eq!(result.metadata["shared"].as_i64(), Some(2));
        assert_eq!(result.metadata["only_a"].as_bool(), Some(true));
    }
}
