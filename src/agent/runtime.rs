use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::AgentConfig;
use crate::transport::{ChatCommand, ChatEvent, IncomingMessage};

use super::chat::ChatService;
use super::history::ChannelHistory;

/// Wraps a failure in the user-facing apology posted to the channel.
pub fn error_reply(error: &str) -> String {
    format!("「{error}」っていうエラーが出たよ。何かがうまくいっていないみたい。")
}

/// The bot runtime.
///
/// Receives transport events, keeps recent channel history, asks the
/// chat service for a reply when the bot is mentioned, and posts it back.
pub struct BotRuntime {
    config: AgentConfig,
    chat: ChatService,
    history: ChannelHistory,
}

impl BotRuntime {
    pub fn new(config: AgentConfig, chat: ChatService) -> Self {
        let history = ChannelHistory::new(config.history_limit);
        Self {
            config,
            chat,
            history,
        }
    }

    /// Main bot loop. Returns when the transport closes its event channel.
    pub async fn run(
        &mut self,
        mut event_rx: mpsc::Receiver<ChatEvent>,
        cmd_tx: mpsc::Sender<ChatCommand>,
    ) -> Result<()> {
        info!("Bot runtime started — waiting for messages...");

        while let Some(event) = event_rx.recv().await {
            match event {
                ChatEvent::Connected => {
                    info!("✓ {} is online and ready", self.config.name);
                }
                ChatEvent::Message(msg) => {
                    if let Some(reply) = self.handle_message(&msg, &cmd_tx).await {
                        let _ = cmd_tx
                            .send(ChatCommand::SendMessage {
                                channel: msg.channel.clone(),
                                body: reply,
                            })
                            .await;
                    }
                }
                ChatEvent::Error(e) => {
                    error!("Transport error: {e}");
                }
            }
        }

        info!("Transport closed, stopping runtime");
        Ok(())
    }

    /// Records the message and, when it is addressed to the bot, produces
    /// the reply to post. Failures become an apology message.
    async fn handle_message(
        &mut self,
        msg: &IncomingMessage,
        cmd_tx: &mpsc::Sender<ChatCommand>,
    ) -> Option<String> {
        self.history.record(&msg.channel, &msg.author, &msg.content);

        if msg.author_is_bot {
            return None;
        }
        debug!("{} ({}): {}", msg.author, msg.channel, msg.content);
        if !msg.mentions_bot {
            return None;
        }

        let _ = cmd_tx
            .send(ChatCommand::SendTyping {
                channel: msg.channel.clone(),
            })
            .await;

        let transcript = self.history.transcript(&msg.channel);
        debug!("Context for {}:\n{transcript}", msg.channel);

        let reply = match self.chat.invoke(&transcript).await {
            Ok(text) => {
                info!("Reply in {}: {} chars", msg.channel, text.chars().count());
                debug!("{text}");
                text
            }
            Err(e) => {
                error!("Error processing message: {e}");
                error_reply(&e.to_string())
            }
        };

        // Apologies stay in history too, as a channel fetch would return them.
        self.history.record(&msg.channel, &self.config.name, &reply);
        Some(reply)
    }
}
