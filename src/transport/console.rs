//! Line-based transport over stdin/stdout.
//!
//! Each input line is one message in a single channel. `author: text`
//! sets the author, plain text is posted as `you`. A line mentions the bot
//! when it contains `@<mention_name>`. Replies are printed as
//! `<bot name>: <body>`.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{ChatCommand, ChatEvent, IncomingMessage};

/// Channel name used for every console message.
pub const CONSOLE_CHANNEL: &str = "console";

const DEFAULT_AUTHOR: &str = "you";

pub struct ConsoleTransport {
    bot_name: String,
    mention_name: String,
}

impl ConsoleTransport {
    pub fn new(bot_name: &str, mention_name: &str) -> Self {
        Self {
            bot_name: bot_name.to_string(),
            mention_name: mention_name.to_string(),
        }
    }

    /// Starts the reader and writer tasks and returns communication channels.
    ///
    /// The event channel closes when stdin reaches end of file.
    pub async fn connect(self) -> Result<(mpsc::Receiver<ChatEvent>, mpsc::Sender<ChatCommand>)> {
        let (event_tx, event_rx) = mpsc::channel::<ChatEvent>(100);
        let (cmd_tx, cmd_rx) = mpsc::channel::<ChatCommand>(100);

        let _ = event_tx.send(ChatEvent::Connected).await;

        tokio::spawn(Self::read_loop(self.mention_name.clone(), event_tx));
        tokio::spawn(Self::write_loop(self.bot_name, cmd_rx));

        info!("Console transport ready — mention the bot with @{}", self.mention_name);
        Ok((event_rx, cmd_tx))
    }

    async fn read_loop(mention_name: String, event_tx: mpsc::Sender<ChatEvent>) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(msg) = parse_line(&line, &mention_name) else {
                        continue;
                    };
                    if event_tx.send(ChatEvent::Message(msg)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    let _ = event_tx.send(ChatEvent::Error(format!("stdin: {e}"))).await;
                    break;
                }
            }
        }
    }

    async fn write_loop(bot_name: String, mut cmd_rx: mpsc::Receiver<ChatCommand>) {
        let mut stdout = tokio::io::stdout();
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                ChatCommand::SendMessage { body, .. } => {
                    let line = format!("{bot_name}: {body}\n");
                    if let Err(e) = stdout.write_all(line.as_bytes()).await {
                        error!("Failed to write to stdout: {e}");
                        break;
                    }
                    let _ = stdout.flush().await;
                }
                ChatCommand::SendTyping { .. } => {
                    debug!("{bot_name} is typing...");
                }
            }
        }
    }
}

/// Parses one console line. Returns None for blank lines.
pub fn parse_line(line: &str, mention_name: &str) -> Option<IncomingMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (author, content) = match trimmed.split_once(':') {
        Some((author, content))
            if !author.trim().is_empty()
                && !author.contains(char::is_whitespace)
                && !content.trim().is_empty() =>
        {
            (author.trim(), content.trim())
        }
        _ => (DEFAULT_AUTHOR, trimmed),
    };

    Some(IncomingMessage {
        channel: CONSOLE_CHANNEL.to_string(),
        author: author.to_string(),
        author_is_bot: false,
        mentions_bot: mentions(content, mention_name),
        content: content.to_string(),
    })
}

/// True when `content` contains `@mention_name` as a whole handle,
/// ignoring case. `@stackchanfan` does not mention `stackchan`.
fn mentions(content: &str, mention_name: &str) -> bool {
    let content = content.to_lowercase();
    let mention = format!("@{}", mention_name.to_lowercase());
    let is_handle_char = |c: char| c.is_ascii_alphanumeric() || c == '_';
    content.match_indices(&mention).any(|(start, _)| {
        let before = content[..start].chars().next_back();
        let after = content[start + mention.len()..].chars().next();
        !before.is_some_and(is_handle_char) && !after.is_some_and(is_handle_char)
    })
}
