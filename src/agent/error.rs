//! Failures of one `ChatService::invoke` call.

use thiserror::Error;

use crate::commands::CommandError;

#[derive(Debug, Error)]
pub enum ChatError {
    /// The backend answered with something unusable.
    #[error("{0}")]
    Model(String),

    /// Every allowed round-trip was spent without a final answer.
    #[error("{0}")]
    ExhaustedRetries(String),

    /// The model called a command with arguments that do not fit its schema.
    #[error("invalid arguments for {command}: {message}")]
    ArgumentValidation { command: String, message: String },

    /// A command handler failed outright.
    #[error("command {command} failed: {source}")]
    Command {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    /// The completion backend could not be reached or rejected the request.
    #[error("completion request failed: {0}")]
    Backend(#[source] anyhow::Error),
}

impl ChatError {
    pub fn model(message: impl Into<String>) -> Self {
        ChatError::Model(message.into())
    }

    /// Attaches the command name to a handler-level failure.
    pub fn from_command(command: &str, err: CommandError) -> Self {
        match err {
            CommandError::InvalidArguments(message) => ChatError::ArgumentValidation {
                command: command.to_string(),
                message,
            },
            CommandError::Failed(source) => ChatError::Command {
                command: command.to_string(),
                source,
            },
        }
    }
}
