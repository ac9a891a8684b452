//! `LlmClient` trait — abstraction over chat-completion backends.

use anyhow::Result;
use async_trait::async_trait;

use super::{LlmResponse, Message, ToolDefinition};

/// Abstraction over chat-completion backends.
///
/// The completion loop only depends on this trait, so tests can script
/// backend responses without any network access.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends the full conversation plus the available tools and returns
    /// the backend's candidate answers.
    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmResponse>;

    /// Human-readable description of the provider and model,
    /// e.g. `"openai (gpt-4o-mini)"`.
    fn description(&self) -> String;
}
