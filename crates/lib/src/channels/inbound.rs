//! Inbound Slack events decoded from Socket Mode envelopes.
//!
//! Each event is built once from the envelope payload, handed to the bot, and dropped
//! when the handler finishes.

use serde::Deserialize;

/// A file attached to a message or uploaded through a modal `file_input`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlackFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mimetype: String,
    /// Private download URL; requires the bot token as a bearer credential.
    #[serde(default)]
    pub url_private: Option<String>,
    #[serde(default)]
    pub thumb_360: Option<String>,
}

impl SlackFile {
    pub fn is_image(&self) -> bool {
        self.mimetype.starts_with("image/")
    }
}

/// Slack event delivered to the bot.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    AppMention {
        channel: String,
        ts: String,
        thread_ts: Option<String>,
    },
    Message {
        channel: String,
        ts: String,
        thread_ts: Option<String>,
        /// Set when the message was posted by a bot (including this one).
        bot_id: Option<String>,
        files: Vec<SlackFile>,
    },
    SlashCommand {
        command: String,
        trigger_id: String,
        channel_id: String,
        user_id: String,
        text: String,
    },
    ViewSubmission {
        callback_id: String,
        user_id: String,
        private_metadata: String,
        /// Raw `view.state.values`: block id -> action id -> element state.
        values: serde_json::Value,
    },
}

impl InboundEvent {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::AppMention { .. } => "app_mention",
            InboundEvent::Message { .. } => "message",
            InboundEvent::SlashCommand { .. } => "slash_command",
            InboundEvent::ViewSubmission { .. } => "view_submission",
        }
    }
}
