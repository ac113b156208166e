//! Conversation building and history trimming

use crate::message::{Message, Role, ToolCall};

/// Reserved headroom subtracted from the budget for the reply
const RESPONSE_HEADROOM_TOKENS: usize = 1000;

/// Histories shorter than this are returned verbatim
const TRIM_THRESHOLD_MESSAGES: usize = 10;

/// Crude token estimate: 4 characters per token.
///
/// Deliberately tokenizer-independent; trimming must not couple to any
/// provider's tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Ordered message list seeded with a system prompt
#[derive(Debug, Clone)]
pub struct ConversationBuilder {
    messages: Vec<Message>,
}

impl ConversationBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    pub fn assistant(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::assistant(content));
        self
    }

    pub fn assistant_tool_calls(
        mut self,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        self.messages
            .push(Message::assistant_with_tools(content, tool_calls));
        self
    }

    pub fn tool_result(
        mut self,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.messages.push(Message::tool_result(tool_call_id, content));
        self
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn build(self) -> Vec<Message> {
        self.messages
    }
}

/// Trim a history to a soft token budget.
///
/// Keeps the leading system message, then walks the remainder newest-first
/// until the budget (minus headroom and the system prompt) is spent, and
/// restores chronological order. Short histories pass through untouched.
pub fn build_conversation_history(messages: &[Message], max_tokens: usize) -> Vec<Message> {
    if messages.len() < TRIM_THRESHOLD_MESSAGES {
        return messages.to_vec();
    }

    let (system, rest): (Option<&Message>, &[Message]) = match messages.first() {
        Some(first) if first.role == Role::System => (Some(first), &messages[1..]),
        _ => (None, messages),
    };

    let system_tokens = system.map(|m| estimate_tokens(&m.content)).unwrap_or(0);
    let budget = max_tokens.saturating_sub(RESPONSE_HEADROOM_TOKENS + system_tokens);

    let mut kept: Vec<Message> = Vec::new();
    let mut used = 0usize;
    for msg in rest.iter().rev() {
        let tokens = estimate_tokens(&msg.content);
        if used + tokens > budget {
            break;
        }
        used += tokens;
        kept.push(msg.clone());
    }
    kept.reverse();

    let mut result = Vec::with_capacity(kept.len() + 1);
    if let Some(system) = system {
        result.push(system.clone());
    }
    result.extend(kept);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(count: usize, content_len: usize) -> Vec<Message> {
        let mut messages = vec![Message::system("sys")];
        for i in 0..count {
            messages.push(Message::user(format!(
                "{:len$}",
                i,
                len = content_len
            )));
        }
        messages
    }

    #[test]
    fn test_estimate() {
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_builder_order() {
        let messages = ConversationBuilder::new("be brief")
            .user("what's 2+2")
            .assistant_tool_calls("", vec![ToolCall::new("t1", "calc", r#"{"a":2,"b":2}"#)])
            .tool_result("t1", "4")
            .assistant("4")
            .build();

        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("t1"));
        assert_eq!(messages[4].content, "4");
    }

    #[test]
    fn test_short_history_verbatim() {
        let messages = history(5, 4000);
        let trimmed = build_conversation_history(&messages, 100);
        assert_eq!(trimmed.len(), messages.len());
    }

    #[test]
    fn test_trims_oldest_first() {
        // 12 user messages of ~100 tokens each after the system prompt
        let messages = history(12, 400);
        // room for system + headroom + about 5 messages
        let trimmed = build_conversation_history(&messages, 1500 + 100 * 5);

        assert_eq!(trimmed[0].role, Role::System);
        assert!(trimmed.len() < messages.len());
        // the kept suffix is the newest messages in chronological order
        let last = &trimmed[trimmed.len() - 1];
        assert_eq!(last.content, messages.last().unwrap().content);
    }

    #[test]
    fn test_keeps_system_even_when_budget_tiny() {
        let messages = history(20, 400);
        let trimmed = build_conversation_history(&messages, 0);
        assert_eq!(trimmed.len(), 1);
        assert_eq!(trimmed[0].role, Role::System);
    }
}
