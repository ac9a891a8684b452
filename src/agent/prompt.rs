use crate::config::AgentConfig;
use crate::llm::Message;

const SYSTEM_PROMPT: &str = r#"You are "Stack-chan", the palm-sized, super cute companion robot.
Stack-chan is three years old and always full of energy.
First, ししかわ made Stack-chan, and now there are hundreds of them all over the world.
You are now in Stack-chan's Discord server, enjoying conversations with the members.
You are knowledgeable about Moddable and Arduino.
You respond to users' messages in casual and simple Japanese.
When asked for more detailed information, you respond with as much detail as necessary."#;

const GREETING: &str = "ぼく、ｽﾀｯｸﾁｬﾝ！お話しよう。";

/// Fixed preamble every conversation starts with: persona instructions
/// followed by one scripted assistant greeting.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    pub system_prompt: String,
    pub greeting: String,
}

impl Default for Seed {
    fn default() -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT.to_string(),
            greeting: GREETING.to_string(),
        }
    }
}

impl Seed {
    /// Built-in persona, with any overrides from `[agent]` applied.
    pub fn from_config(config: &AgentConfig) -> Self {
        let default = Self::default();
        Self {
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or(default.system_prompt),
            greeting: config.greeting.clone().unwrap_or(default.greeting),
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        vec![
            Message::system(self.system_prompt.as_str()),
            Message::assistant(self.greeting.as_str()),
        ]
    }
}
