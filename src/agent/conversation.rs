use crate::llm::{Message, ToolCall};

use super::error::ChatError;

/// Append-only message list owned by a single `invoke` call.
///
/// Tool results can only be appended for calls that an earlier
/// assistant message requested.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(seed: Vec<Message>) -> Self {
        Self { messages: seed }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Records the assistant message that requested `tool_calls`.
    pub fn push_tool_request(&mut self, content: Option<String>, tool_calls: Vec<ToolCall>) {
        self.messages.push(Message::Assistant {
            content,
            tool_calls,
        });
    }

    /// Appends the result for `call_id`.
    pub fn push_tool_result(
        &mut self,
        call_id: &str,
        content: impl Into<String>,
    ) -> Result<(), ChatError> {
        if !self.has_tool_request(call_id) {
            return Err(ChatError::model(format!(
                "tool result for unknown call: {call_id}"
            )));
        }
        self.messages.push(Message::Tool {
            content: content.into(),
            tool_call_id: call_id.to_string(),
        });
        Ok(())
    }

    fn has_tool_request(&self, call_id: &str) -> bool {
        self.messages.iter().any(|m| match m {
            Message::Assistant { tool_calls, .. } => tool_calls.iter().any(|c| c.id == call_id),
            _ => false,
        })
    }

    /// Call ids of tool messages that answer no earlier request.
    #[cfg(test)]
    pub fn orphan_tool_results(&self) -> Vec<&str> {
        let mut requested: Vec<&str> = Vec::new();
        let mut orphans = Vec::new();
        for message in &self.messages {
            match message {
                Message::Assistant { tool_calls, .. } => {
                    requested.extend(tool_calls.iter().map(|c| c.id.as_str()));
                }
                Message::Tool { tool_call_id, .. } => {
                    if !requested.contains(&tool_call_id.as_str()) {
                        orphans.push(tool_call_id.as_str());
                    }
                }
                _ => {}
            }
        }
        orphans
    }
}
