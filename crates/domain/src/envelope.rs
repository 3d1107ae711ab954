//! Transport-agnostic message envelopes exchanged with chat channels.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Channel name used for deferred self-messages (background task results).
/// Their `chat_id` carries the origin as `"origin_channel:origin_chat_id"`.
pub const SYSTEM_CHANNEL: &str = "system";

/// Channel name used by scheduled jobs.
pub const CRON_CHANNEL: &str = "cron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    /// Local file paths of attachments (images are inlined for the model).
    #[serde(default)]
    pub media: Vec<PathBuf>,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            media: Vec::new(),
        }
    }

    pub fn with_media(mut self, media: Vec<PathBuf>) -> Self {
        self.media = media;
        self
    }

    /// `channel:chat_id` for this envelope as received.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }

    pub fn is_system(&self) -> bool {
        self.channel == SYSTEM_CHANNEL
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<PathBuf>,
}

impl OutboundMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            media: Vec::new(),
        }
    }
}
