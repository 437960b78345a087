//! Event listener for the bridge event stream.
//!
//! Connects to the sidecar's `/events/poll` HTTP long-polling endpoint and
//! forwards lifecycle, credential, and message events over an mpsc channel.
//! The channel is the single inbound stream consumed by the dispatcher loop.

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::message::{InboundMessage, UpsertKind};
use super::Credentials;

/// Phase reported by a connection update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    /// Handshake in progress.
    Connecting,
    /// Session established.
    Open,
    /// Session ended.
    Close,
}

/// A connection lifecycle update, mirroring baileys `connection.update`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectionUpdate {
    /// New phase, when the update carries one.
    #[serde(default)]
    pub connection: Option<ConnectionPhase>,
    /// Pairing challenge to be rendered as a QR code.
    #[serde(default)]
    pub qr: Option<String>,
    /// Disconnect status code for `close` updates.
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Human-readable disconnect cause.
    #[serde(default)]
    pub error: Option<String>,
}

/// An event from the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WhatsAppEvent {
    /// Connection lifecycle change or pairing challenge.
    Connection(ConnectionUpdate),
    /// Authentication material changed and must be persisted.
    Creds {
        /// Full credential blob.
        creds: Credentials,
    },
    /// A batch of messages was upserted.
    Messages {
        /// How the batch entered the bridge.
        kind: UpsertKind,
        /// Messages in arrival order.
        #[serde(default)]
        messages: Vec<InboundMessage>,
    },
}

impl WhatsAppEvent {
    /// Event type name for logs. Never includes the payload, which may hold
    /// credentials.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Creds { .. } => "creds",
            Self::Messages { .. } => "messages",
        }
    }
}

/// Long-poll timeout for the HTTP client (seconds).
const POLL_TIMEOUT_SECS: u64 = 60;

/// Initial reconnect backoff for the poll stream (milliseconds).
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum reconnect backoff (milliseconds).
const MAX_BACKOFF_MS: u64 = 30_000;

/// Spawn an event listener that forwards events to the given channel.
///
/// Returns immediately. The listener runs as a background Tokio task and
/// re-opens the poll stream with exponential backoff on network errors. It
/// stops once the receiving side of `event_tx` is dropped.
pub fn spawn_event_listener(
    base_url: String,
    event_tx: mpsc::Sender<WhatsAppEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let poll_url = format!("{}/events/poll", base_url.trim_end_matches('/'));
        let mut backoff_ms: u64 = INITIAL_BACKOFF_MS;

        loop {
            info!(url = %poll_url, "connecting to WhatsApp event stream");

            match poll_events(&poll_url, &event_tx).await {
                Ok(()) => {
                    info!("WhatsApp event stream closed normally");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, backoff_ms, "WhatsApp event stream error, reconnecting");
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                    backoff_ms = backoff_ms.saturating_mul(2).min(MAX_BACKOFF_MS);
                }
            }
        }
    })
}

/// Decode one poll response body into events, skipping malformed entries.
///
/// A single unknown event type must not drop the rest of the batch.
pub fn decode_batch(body: &str) -> Vec<WhatsAppEvent> {
    let raw: Vec<serde_json::Value> = match serde_json::from_str(body) {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, "event poll returned a non-array body");
            return Vec::new();
        }
    };
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<WhatsAppEvent>(value) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(error = %e, "skipping undecodable bridge event");
                None
            }
        })
        .collect()
}

/// Poll the sidecar for events in a loop. Returns `Err` on non-timeout
/// network errors so the caller can reconnect with backoff.
async fn poll_events(
    poll_url: &str,
    event_tx: &mpsc::Sender<WhatsAppEvent>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(POLL_TIMEOUT_SECS))
        .build()?;

    loop {
        match client.get(poll_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let body = resp.text().await?;
                for event in decode_batch(&body) {
                    debug!(kind = event.kind_name(), "received WhatsApp event");
                    if event_tx.send(event).await.is_err() {
                        // Receiver dropped, shut down cleanly.
                        return Ok(());
                    }
                }
            }
            Ok(resp) => {
                debug!(status = %resp.status(), "event poll returned non-200");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
            Err(e) if e.is_timeout() => {
                // Long-poll timeout expired, retry immediately.
                continue;
            }
            Err(e) => {
                return Err(e.into());
            }
        }
    }
}
