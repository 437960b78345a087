//! HTTP client for the WhatsApp bridge sidecar.
//!
//! Every outbound WhatsApp operation goes through this client, which talks to
//! the baileys-based Node.js bridge over plain HTTP on localhost.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::message::{GroupMetadata, ImageContent};
use super::{Credentials, Presence, Transport, WhatsAppError};

/// Default port the WhatsApp bridge listens on.
pub const DEFAULT_BRIDGE_PORT: u16 = 3001;

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout for normal operations. Media downloads share it.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Number of health-check retries before giving up.
const HEALTH_CHECK_RETRIES: u32 = 15;

/// Delay between health-check attempts in milliseconds.
const HEALTH_CHECK_DELAY_MS: u64 = 2000;

/// Client for the WhatsApp HTTP bridge.
#[derive(Debug, Clone)]
pub struct WhatsAppClient {
    client: reqwest::Client,
    base_url: String,
}

/// Connection status from the sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Whether the sidecar is connected to WhatsApp.
    pub connected: bool,
    /// The JID of the linked account, if connected.
    #[serde(default)]
    pub me: Option<String>,
}

/// Response envelope from the bridge HTTP API.
#[derive(Deserialize)]
struct BridgeResponse<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Base64-encoded binary payload.
#[derive(Deserialize)]
struct MediaPayload {
    data: String,
}

impl WhatsAppClient {
    /// Create a new client pointing at the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url }
    }

    /// Create a client connecting to `http://127.0.0.1:{port}`.
    pub fn with_port(port: u16) -> Self {
        Self::new(format!("http://127.0.0.1:{port}"))
    }

    /// Returns the base URL of the sidecar.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check whether the sidecar answers its status endpoint.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/status", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(resp) if resp.status().is_success())
    }

    /// Wait for the sidecar to become reachable, retrying with a fixed delay.
    pub async fn wait_healthy(&self) -> Result<(), WhatsAppError> {
        for attempt in 0..HEALTH_CHECK_RETRIES {
            if self.health_check().await {
                return Ok(());
            }
            if attempt < HEALTH_CHECK_RETRIES.saturating_sub(1) {
                tokio::time::sleep(std::time::Duration::from_millis(HEALTH_CHECK_DELAY_MS)).await;
            }
        }
        Err(WhatsAppError::SidecarNotRunning)
    }

    /// Get the current connection status from the sidecar.
    pub async fn status(&self) -> Result<BridgeStatus, WhatsAppError> {
        let url = format!("{}/status", self.base_url);
        let resp = self.client.get(&url).send().await?;
        unwrap_envelope(resp).await
    }

    /// Get the current pairing QR payload, if the bridge is awaiting a scan.
    pub async fn get_qr(&self) -> Result<String, WhatsAppError> {
        let url = format!("{}/qr", self.base_url);
        let resp = self.client.get(&url).send().await?;
        unwrap_envelope(resp).await
    }

    async fn post_ok(&self, path: &str, body: &serde_json::Value) -> Result<(), WhatsAppError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.client.post(&url).json(body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            warn!(%status, path, "bridge request failed: {body_text}");
            return Err(if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
                WhatsAppError::NotConnected
            } else {
                WhatsAppError::Bridge(format!("{status}: {body_text}"))
            });
        }
        Ok(())
    }
}

/// Decode a bridge envelope, mapping `error` and missing `data` to errors.
async fn unwrap_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, WhatsAppError> {
    let status = resp.status();
    let body: BridgeResponse<T> = resp
        .json()
        .await
        .map_err(|e| WhatsAppError::InvalidPayload(e.to_string()))?;
    match body.data {
        Some(data) if body.success || status.is_success() => Ok(data),
        _ => Err(WhatsAppError::Bridge(
            body.error
                .unwrap_or_else(|| format!("empty response ({status})")),
        )),
    }
}

#[async_trait]
impl Transport for WhatsAppClient {
    async fn connect(&self, credentials: Option<Credentials>) -> Result<(), WhatsAppError> {
        let body = serde_json::json!({ "credentials": credentials });
        self.post_ok("/connect", &body).await?;
        debug!(base_url = %self.base_url, "bridge session requested");
        Ok(())
    }

    async fn send_text(
        &self,
        jid: &str,
        text: &str,
        mentions: &[String],
    ) -> Result<(), WhatsAppError> {
        let body = serde_json::json!({ "jid": jid, "text": text, "mentions": mentions });
        self.post_ok("/send", &body).await?;
        debug!(jid, mentions = mentions.len(), "message sent via WhatsApp");
        Ok(())
    }

    async fn send_sticker(&self, jid: &str, webp: Vec<u8>) -> Result<(), WhatsAppError> {
        let size = webp.len();
        let body = serde_json::json!({ "jid": jid, "data": BASE64.encode(webp) });
        self.post_ok("/send/sticker", &body).await?;
        debug!(jid, size, "sticker sent via WhatsApp");
        Ok(())
    }

    async fn set_presence(&self, jid: &str, presence: Presence) -> Result<(), WhatsAppError> {
        let body = serde_json::json!({ "jid": jid, "presence": presence });
        self.post_ok("/presence", &body).await
    }

    async fn group_metadata(&self, jid: &str) -> Result<GroupMetadata, WhatsAppError> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| WhatsAppError::Bridge(format!("invalid bridge url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| WhatsAppError::Bridge("bridge url cannot be a base".to_owned()))?
            .pop_if_empty()
            .extend(["groups", jid, "metadata"]);
        let resp = self.client.get(url).send().await?;
        unwrap_envelope(resp).await
    }

    async fn download_media(&self, image: &ImageContent) -> Result<Vec<u8>, WhatsAppError> {
        let url = format!("{}/media/download", self.base_url);
        let body = serde_json::json!({ "media": image.media, "mimetype": image.mimetype });
        let resp = self.client.post(&url).json(&body).send().await?;
        let payload: MediaPayload = unwrap_envelope(resp).await?;
        let bytes = BASE64
            .decode(payload.data.as_bytes())
            .map_err(|e| WhatsAppError::InvalidPayload(format!("media is not base64: {e}")))?;
        debug!(size = bytes.len(), "media downloaded");
        Ok(bytes)
    }
}
