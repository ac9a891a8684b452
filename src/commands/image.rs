//! Image generation command.
//!
//! The prompt is wrapped in a fixed style suffix before submission. A
//! backend answer without any created image is a soft failure: the model
//! receives [`FAILED_TO_CREATE`] and decides how to tell the user.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::Handler;

/// Tool result returned when no image was created.
pub const FAILED_TO_CREATE: &str = "failed to create";

/// What the image backend produced.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImages {
    /// Number of created assets as reported by the backend.
    pub created: u64,
    pub urls: Vec<String>,
}

/// Abstraction over image generation backends.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Submits an already styled prompt.
    async fn generate(&self, prompt: &str) -> Result<GeneratedImages>;
}

/// Applies the house style to a user-level prompt.
pub fn style_prompt(prompt: &str) -> String {
    format!("\"{prompt}\" in super-kawaii style")
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct ImageArgs {
    pub prompt: String,
}

/// `generate_image` — creates one picture and returns its URL.
pub struct GenerateImageCommand {
    generator: Arc<dyn ImageGenerator>,
}

impl GenerateImageCommand {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Handler for GenerateImageCommand {
    type Args = ImageArgs;
    type Output = String;

    fn name(&self) -> &'static str {
        "generate_image"
    }

    fn description(&self) -> &'static str {
        "与えられたプロンプトから画像を1枚生成して、URLを返します。"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "画像生成のためのプロンプト（英語）。詳細に記述することが望ましい。"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn run(&self, args: ImageArgs) -> Result<String> {
        let images = self.generator.generate(&style_prompt(&args.prompt)).await?;
        if images.created > 0 {
            if let Some(url) = images.urls.into_iter().next() {
                return Ok(url);
            }
        }
        warn!("Image generation produced nothing for '{}'", args.prompt);
        Ok(FAILED_TO_CREATE.to_string())
    }
}
