//! Chat platform boundary.
//!
//! A transport turns platform traffic into [`ChatEvent`]s and carries out
//! [`ChatCommand`]s. The runtime only ever sees this channel pair, so the
//! platform (console, Discord gateway, ...) can change without touching it.

pub mod console;

/// An inbound channel message.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Channel the message was posted in
    pub channel: String,
    /// Display name of the author
    pub author: String,
    pub author_is_bot: bool,
    /// Whether the message mentions this bot
    pub mentions_bot: bool,
    pub content: String,
}

/// Events emitted by the transport to the runtime
#[derive(Debug)]
pub enum ChatEvent {
    Connected,
    Message(IncomingMessage),
    Error(String),
}

/// Commands sent by the runtime to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    SendMessage { channel: String, body: String },
    /// Typing indicator while a reply is being generated
    SendTyping { channel: String },
}
