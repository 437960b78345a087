//! Text command grammar and the fixed dispatch table.
//!
//! A command is a message starting with the trigger prefix. The first
//! space-separated token (lowercased) names the command; the rest is its
//! argument. Handlers never fail: every error is turned into a [`Reply`]
//! carrying user-facing text.

use crate::whatsapp::message::MessageContent;

pub mod mention_all;
pub mod runtime;
pub mod sticker;

/// A parsed command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    /// Lowercased command token, without the prefix.
    pub command: String,
    /// Everything after the command token, trimmed.
    pub args: String,
    /// Chat the command was sent in.
    pub chat: String,
    /// Author of the command.
    pub sender: String,
    /// Content of the message the command replies to.
    pub quoted: Option<MessageContent>,
}

/// Split command text into `(command, args)`.
///
/// Returns `None` when `text` does not start with `prefix`.
pub fn parse_command(text: &str, prefix: &str) -> Option<(String, String)> {
    if prefix.is_empty() || !text.starts_with(prefix) {
        return None;
    }
    let trimmed = text.trim();
    let body = trimmed.strip_prefix(prefix).unwrap_or(trimmed);
    let (command, args) = match body.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (body, ""),
    };
    Some((command.to_lowercase(), args.to_owned()))
}

/// Outbound action produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Text message, optionally mentioning participants.
    Text {
        /// Message body.
        text: String,
        /// JIDs to highlight.
        mentions: Vec<String>,
    },
    /// WebP sticker.
    Sticker {
        /// Encoded sticker bytes.
        webp: Vec<u8>,
    },
}

impl Reply {
    /// Plain text reply without mentions.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            mentions: Vec::new(),
        }
    }

    /// Text to send instead when delivering this reply fails.
    ///
    /// Plain texts have no fallback; there is nothing simpler to send.
    pub fn failure_text(&self) -> Option<&'static str> {
        match self {
            Self::Sticker { .. } => Some(sticker::FAILED),
            Self::Text { mentions, .. } if !mentions.is_empty() => Some(mention_all::FAILED),
            Self::Text { .. } => None,
        }
    }
}

/// Reply for an unrecognised command token.
pub fn unknown_command(command: &str) -> Reply {
    Reply::text(format!("❓ Command \"{command}\" tidak dikenal"))
}
