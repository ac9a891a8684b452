//! Commands the model can invoke through tool calls.
//!
//! Each command kind is a [`Handler`] with typed arguments and a typed
//! output. [`Command`] closes the set so the registry can hold them in a
//! plain `Vec` and dispatch without trait objects or string-keyed casts.

pub mod cosense;
pub mod image;
pub mod registry;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::llm::ToolDefinition;

pub use cosense::{CosenseApi, CosenseClient, PageTextCommand, SearchCommand};
pub use image::{GenerateImageCommand, ImageGenerator};
pub use registry::CommandRegistry;

/// Failure while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The model-supplied arguments did not match the command's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The handler itself failed (network error, unreadable response, ...).
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// A command with strongly-typed arguments and output.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Parsed from the tool call's JSON argument string.
    type Args: DeserializeOwned + Send;
    /// Serialized back to the model as the tool result.
    type Output: Serialize + Send;

    /// Unique tool name shown to the model.
    fn name(&self) -> &'static str;

    /// Tells the model when to invoke the command.
    fn description(&self) -> &'static str;

    /// JSON Schema of `Args`, sent as the tool's `parameters`.
    fn parameters_schema(&self) -> Value;

    async fn run(&self, args: Self::Args) -> anyhow::Result<Self::Output>;
}

/// Parses the raw argument string, runs the handler and serializes its output.
async fn dispatch<H: Handler>(handler: &H, arguments: &str) -> Result<Value, CommandError> {
    let args: H::Args = serde_json::from_str(arguments)
        .map_err(|e| CommandError::InvalidArguments(e.to_string()))?;
    let output = handler.run(args).await?;
    Ok(serde_json::to_value(output).map_err(anyhow::Error::from)?)
}

/// Every command kind the bot knows about.
pub enum Command {
    SearchCosense(SearchCommand),
    CosensePageText(PageTextCommand),
    GenerateImage(GenerateImageCommand),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SearchCosense(h) => h.name(),
            Command::CosensePageText(h) => h.name(),
            Command::GenerateImage(h) => h.name(),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Command::SearchCosense(h) => h.description(),
            Command::CosensePageText(h) => h.description(),
            Command::GenerateImage(h) => h.description(),
        }
    }

    pub fn parameters_schema(&self) -> Value {
        match self {
            Command::SearchCosense(h) => h.parameters_schema(),
            Command::CosensePageText(h) => h.parameters_schema(),
            Command::GenerateImage(h) => h.parameters_schema(),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }

    /// Runs the command with the model's raw JSON arguments.
    ///
    /// An absent handler result comes back as `Value::Null`.
    pub async fn execute(&self, arguments: &str) -> Result<Value, CommandError> {
        match self {
            Command::SearchCosense(h) => dispatch(h, arguments).await,
            Command::CosensePageText(h) => dispatch(h, arguments).await,
            Command::GenerateImage(h) => dispatch(h, arguments).await,
        }
    }
}
