use std::collections::{HashMap, VecDeque};

/// One line of channel history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub author: String,
    pub content: String,
}

/// Recent messages per channel, capped at `limit` entries each.
///
/// Stands in for "fetch the last N channel messages" on transports
/// that cannot query history from the server.
pub struct ChannelHistory {
    limit: usize,
    channels: HashMap<String, VecDeque<HistoryEntry>>,
}

impl ChannelHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            channels: HashMap::new(),
        }
    }

    /// Records a message, dropping the oldest one when the channel is full.
    pub fn record(&mut self, channel: &str, author: &str, content: &str) {
        let entries = self.channels.entry(channel.to_string()).or_default();
        if entries.len() == self.limit {
            entries.pop_front();
        }
        entries.push_back(HistoryEntry {
            author: author.to_string(),
            content: content.to_string(),
        });
    }

    /// `author: content` lines, oldest first, separated by a blank line.
    pub fn transcript(&self, channel: &str) -> String {
        self.channels
            .get(channel)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| format!("{}: {}", e.author, e.content))
                    .collect::<Vec<_>>()
                    .join("\n\n")
            })
            .unwrap_or_default()
    }
}
