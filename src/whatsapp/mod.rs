//! WhatsApp adapter: HTTP bridge client, event listener, sidecar setup, and
//! pairing display.
//!
//! Communicates with a baileys-based Docker sidecar via HTTP and long-polling.
//! The rest of the bot only sees the [`Transport`] trait.

use async_trait::async_trait;

pub mod client;
pub mod events;
pub mod message;
pub mod pairing;
pub mod setup;

use message::{GroupMetadata, ImageContent};

/// Opaque authentication material handed out and consumed by the bridge.
pub type Credentials = serde_json::Value;

/// Errors from the WhatsApp adapter.
#[derive(Debug, thiserror::Error)]
pub enum WhatsAppError {
    /// HTTP request to the sidecar failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The sidecar container is not running or not reachable.
    #[error("sidecar not running")]
    SidecarNotRunning,

    /// The sidecar is running but WhatsApp is not connected (needs QR scan).
    #[error("not connected to WhatsApp")]
    NotConnected,

    /// The bridge answered with an error envelope.
    #[error("bridge error: {0}")]
    Bridge(String),

    /// The bridge answered with a payload that could not be decoded.
    #[error("invalid bridge payload: {0}")]
    InvalidPayload(String),

    /// Container setup or lifecycle operation failed.
    #[error("setup failed: {0}")]
    SetupFailed(String),
}

/// Typing indicator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    /// "typing..." shown to the counterpart.
    Composing,
    /// Typing indicator cleared.
    Paused,
}

/// Outbound surface of a messaging connection.
///
/// Implemented by [`client::WhatsAppClient`]; tests substitute a recording
/// double.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start a new session on the bridge, resuming from `credentials` when present.
    async fn connect(&self, credentials: Option<Credentials>) -> Result<(), WhatsAppError>;

    /// Send a text message, highlighting every JID in `mentions`.
    async fn send_text(
        &self,
        jid: &str,
        text: &str,
        mentions: &[String],
    ) -> Result<(), WhatsAppError>;

    /// Send a WebP sticker.
    async fn send_sticker(&self, jid: &str, webp: Vec<u8>) -> Result<(), WhatsAppError>;

    /// Update the typing indicator on a chat.
    async fn set_presence(&self, jid: &str, presence: Presence) -> Result<(), WhatsAppError>;

    /// Fetch the participant list of a group.
    async fn group_metadata(&self, jid: &str) -> Result<GroupMetadata, WhatsAppError>;

    /// Download and decrypt the file behind an image message.
    async fn download_media(&self, image: &ImageContent) -> Result<Vec<u8>, WhatsAppError>;
}
