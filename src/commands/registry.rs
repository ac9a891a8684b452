use std::sync::Arc;

use super::{
    Command, CosenseApi, GenerateImageCommand, ImageGenerator, PageTextCommand, SearchCommand,
};
use crate::llm::ToolDefinition;

/// Ordered, immutable set of commands offered to the model.
///
/// Lookup is by exact name and returns the first match. Names are not
/// checked for duplicates, so callers must not register two commands
/// under the same name.
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl CommandRegistry {
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    /// The bot's standard command set: wiki search, wiki page text, image.
    pub fn builtin(cosense: Arc<dyn CosenseApi>, images: Arc<dyn ImageGenerator>) -> Self {
        Self::new(vec![
            Command::SearchCosense(SearchCommand::new(cosense.clone())),
            Command::CosensePageText(PageTextCommand::new(cosense)),
            Command::GenerateImage(GenerateImageCommand::new(images)),
        ])
    }

    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name() == name)
    }

    /// Tool schemas in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.commands.iter().map(Command::definition).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.commands.iter().map(Command::name).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }
}
