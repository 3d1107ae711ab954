//! Session key parsing and routing.
//!
//! Keys have the shape `channel:chat_id`. Deferred self-messages arrive on
//! the `system` channel with the origin packed into their `chat_id`; those
//! are routed back to the origin so background results land in the
//! conversation that triggered them.

use std::fmt;

use mn_domain::envelope::InboundMessage;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub channel: String,
    pub chat_id: String,
}

impl SessionKey {
    pub fn new(channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Split `raw` on its first `:`. Without a separator (or with an empty
    /// channel part) the whole string is the chat id on `default_channel`.
    pub fn parse(raw: &str, default_channel: &str) -> Self {
        match raw.split_once(':') {
            Some((channel, chat_id)) if !channel.is_empty() => Self::new(channel, chat_id),
            Some((_, chat_id)) => Self::new(default_channel, chat_id),
            None => Self::new(default_channel, raw),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.chat_id)
    }
}

/// Resolve the session (and reply destination) for an inbound message.
pub fn resolve_route(inbound: &InboundMessage, default_channel: &str) -> SessionKey {
    if inbound.is_system() {
        let key = SessionKey::parse(&inbound.chat_id, default_channel);
        tracing::debug!(
            origin = %key,
            sender = %inbound.sender_id,
            "routing system message to origin session"
        );
        key
    } else {
        SessionKey::new(&inbound.channel, &inbound.chat_id)
    }
}
