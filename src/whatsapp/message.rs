//! Inbound message model as delivered by the bridge.
//!
//! The bridge forwards baileys `messages.upsert` batches. Content is modelled
//! as a tagged variant instead of probing optional payload fields.

use serde::{Deserialize, Serialize};

/// JID suffix used by WhatsApp group chats.
pub const GROUP_JID_SUFFIX: &str = "@g.us";

/// Returns `true` when the JID identifies a group chat.
pub fn is_group_jid(jid: &str) -> bool {
    jid.ends_with(GROUP_JID_SUFFIX)
}

/// How a batch of messages entered the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertKind {
    /// Freshly received message; the only kind the bot reacts to.
    Notify,
    /// History sync or messages appended from another device.
    Append,
}

/// Addressing information of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKey {
    /// Chat the message belongs to (user JID or group JID).
    pub remote_jid: String,
    /// Whether the linked account sent this message.
    #[serde(default)]
    pub from_me: bool,
    /// Author inside a group chat. Absent for direct chats.
    #[serde(default)]
    pub participant: Option<String>,
    /// Bridge-assigned message identifier.
    #[serde(default)]
    pub id: Option<String>,
}

/// Media descriptor of an image message.
///
/// `media` is the opaque baileys payload (url, media key, direct path) that
/// the bridge needs to download and decrypt the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    /// Optional caption typed under the image.
    #[serde(default)]
    pub caption: Option<String>,
    /// MIME type announced by the sender.
    #[serde(default)]
    pub mimetype: Option<String>,
    /// Opaque download descriptor passed back to the bridge.
    #[serde(default)]
    pub media: serde_json::Value,
}

/// Message payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text message.
    Conversation {
        /// Message text.
        text: String,
    },
    /// Text message carrying context, e.g. a reply to an earlier message.
    ExtendedText {
        /// Message text.
        text: String,
        /// Content of the message being replied to.
        #[serde(default)]
        quoted: Option<Box<MessageContent>>,
    },
    /// Image message.
    Image(ImageContent),
    /// Any other payload (video, audio, sticker, reaction, ...).
    Other {
        /// baileys content type name, for diagnostics.
        #[serde(default)]
        kind: String,
    },
}

impl MessageContent {
    /// Text that may carry a command.
    ///
    /// Plain conversations win, then the text of an extended text message.
    /// Image captions are deliberately not command text.
    pub fn display_text(&self) -> &str {
        match self {
            Self::Conversation { text } | Self::ExtendedText { text, .. } => text,
            Self::Image(_) | Self::Other { .. } => "",
        }
    }

    /// Content quoted by this message, if any.
    pub fn quoted(&self) -> Option<&MessageContent> {
        match self {
            Self::ExtendedText { quoted, .. } => quoted.as_deref(),
            _ => None,
        }
    }

    /// Short type name used in logs.
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Conversation { .. } => "conversation",
            Self::ExtendedText { .. } => "extended_text",
            Self::Image(_) => "image",
            Self::Other { kind } => kind,
        }
    }
}

/// A single inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Addressing information.
    pub key: MessageKey,
    /// Payload. `None` for protocol stubs (deletions, receipts, ...).
    #[serde(default)]
    pub content: Option<MessageContent>,
    /// Sender display name, if known.
    #[serde(default)]
    pub push_name: Option<String>,
}

impl InboundMessage {
    /// Chat the message arrived in.
    pub fn chat(&self) -> &str {
        &self.key.remote_jid
    }

    /// Author of the message: the group participant, or the chat itself for
    /// direct messages.
    pub fn sender(&self) -> &str {
        self.key
            .participant
            .as_deref()
            .unwrap_or(&self.key.remote_jid)
    }
}

/// Admin role of a group participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    /// Regular group admin.
    Admin,
    /// Group creator.
    Superadmin,
}

/// A group member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Member JID.
    pub id: String,
    /// Admin role, `None` for regular members.
    #[serde(default)]
    pub admin: Option<AdminRole>,
}

/// Group metadata as reported by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    /// Group JID.
    pub id: String,
    /// Group name.
    #[serde(default)]
    pub subject: String,
    /// All members.
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl GroupMetadata {
    /// Whether `jid` holds any admin role in this group.
    pub fn is_admin(&self, jid: &str) -> bool {
        self.participants
            .iter()
            .any(|p| p.id == jid && p.admin.is_some())
    }

    /// JIDs of every participant, in bridge order.
    pub fn participant_ids(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }
}
