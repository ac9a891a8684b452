pub mod chat;
pub mod conversation;
pub mod error;
pub mod history;
pub mod prompt;
pub mod runtime;

pub use chat::ChatService;
pub use runtime::BotRuntime;
