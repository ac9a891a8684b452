//! OpenAI API provider.
//!
//! Calls `POST {base_url}/chat/completions` for the conversation and
//! `POST {base_url}/images/generations` for the image command. Any
//! OpenAI-compatible server works as long as it speaks the same format.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::client::LlmClient;
use super::{Choice, FinishReason, LlmResponse, Message, ToolCall, ToolDefinition};
use crate::commands::image::{GeneratedImages, ImageGenerator};
use crate::config::{ImageConfig, LlmConfig};

// ── Chat completion request types ────────────────────────

/// `/chat/completions` request body.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiToolDef<'a>>,
}

/// Tool definition in `{type: "function", function: {...}}` form.
#[derive(Debug, Serialize)]
struct OpenAiToolDef<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OpenAiFunctionDef<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAiFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

// ── Chat completion response types ───────────────────────

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ── Image generation types ───────────────────────────────

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: &'a str,
    n: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    created: u64,
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
}

// ── OpenAiClient ─────────────────────────────────────────

/// Client for the OpenAI chat completion and image APIs.
pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
    image: ImageConfig,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig, image: ImageConfig) -> Self {
        // Strip trailing slash for consistent URL construction
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            config,
            image,
            base_url,
        }
    }
}

fn into_choice(choice: OpenAiChoice) -> Choice {
    Choice {
        finish_reason: choice
            .finish_reason
            .as_deref()
            .map(FinishReason::from)
            .unwrap_or_else(|| FinishReason::Other(String::new())),
        content: choice.message.content,
        tool_calls: choice.message.tool_calls.unwrap_or_default(),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmResponse> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            tools: tools
                .iter()
                .map(|td| OpenAiToolDef {
                    tool_type: "function",
                    function: OpenAiFunctionDef {
                        name: &td.name,
                        description: &td.description,
                        parameters: &td.parameters,
                    },
                })
                .collect(),
        };

        debug!(
            "Calling OpenAI API ({}) with {} messages, {} tools",
            self.config.model,
            messages.len(),
            tools.len()
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({status}): {body}");
        }

        let resp: ChatResponse = response.json().await?;

        let (input_tokens, output_tokens) = resp
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        info!("LLM response: {input_tokens} in / {output_tokens} out tokens");

        Ok(LlmResponse {
            choices: resp.choices.into_iter().map(into_choice).collect(),
            input_tokens,
            output_tokens,
        })
    }

    fn description(&self) -> String {
        format!("{} ({})", self.config.provider, self.config.model)
    }
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImages> {
        let request = ImageRequest {
            model: self.image.model.as_deref(),
            prompt,
            n: 1,
            size: self.image.size.as_deref(),
        };

        debug!("Requesting image generation: {prompt}");

        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI image API error ({status}): {body}");
        }

        let resp: ImageResponse = response.json().await?;

        Ok(GeneratedImages {
            created: resp.created,
            urls: resp.data.into_iter().filter_map(|d| d.url).collect(),
        })
    }
}
