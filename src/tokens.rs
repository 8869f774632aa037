//! Token counting for context-window budgeting.

use crate::message::{Message, MessagePart};

/// Counts tokens for budget enforcement.
///
/// Pluggable so a provider-accurate tokenizer can replace the default
/// heuristic; exchanged at stage construction time.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in a flat text.
    fn count_text(&self, text: &str) -> usize;

    /// Count tokens in a message: flat content, text parts, and tool-call
    /// arguments all contribute.
    fn count_message(&self, message: &Message) -> usize {
        let mut total = self.count_text(&message.content);
        for part in &message.parts {
            if let MessagePart::Text(text) = part {
                total += self.count_text(text);
            }
        }
        for call in &message.tool_calls {
            total += self.count_text(&call.name);
            total += self.count_text(&call.arguments.to_string());
        }
        total
    }
}

/// Whitespace-word heuristic at ~1.3 tokens per word.
///
/// Close enough for budgeting; exact provider tokenizers plug in through
/// [`TokenCounter`] when the budget must be tight.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count_text(&self, text: &str) -> usize {
        let words = text.split_whitespace().count();
        // words * 1.3, rounded up, in integer arithmetic
        (words * 13).div_ceil(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_text_is_zero() {
        assert_eq!(HeuristicTokenCounter.count_text(""), 0);
        assert_eq!(HeuristicTokenCounter.count_text("   "), 0);
    }

    #[test]
    fn test_word_scaling() {
        // 10 words * 1.3 = 13 tokens
        let text = "one two three four five six seven eight nine ten";
        assert_eq!(HeuristicTokenCounter.count_text(text), 13);
        // 1 word rounds up to 2
        assert_eq!(HeuristicTokenCounter.count_text("word"), 2);
    }

    #[test]
    fn test_message_includes_tool_call_arguments() {
        let plain = Message::user("run the search");
        let with_tool = Message::user("run the search").with_tool_call(crate::message::ToolCall::new(
            "c1",
            "search",
            json!({"query": "streaming pipelines in rust"}),
        ));
        let counter = HeuristicTokenCounter;
        assert!(counter.count_message(&with_tool) > counter.count_message(&plain));
    }

    #[test]
    fn test_message_includes_text_parts() {
        let bare = Message::user("hi");
        let with_part = Message::user("hi")
            .with_part(MessagePart::Text("an additional longer transcript part".to_string()));
        let counter = HeuristicTokenCounter;
        assert!(counter.count_message(&with_part) > counter.count_message(&bare));
    }
}
