//! Per-message command pipeline.
//!
//! For every inbound message: filter, parse, show a short typing indicator,
//! run the matching handler, deliver its reply. Nothing in here returns an
//! error to the caller; failures become replies or log entries.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::commands::runtime::{handle_runtime, Uptime};
use crate::commands::{mention_all, parse_command, sticker, unknown_command, CommandRequest, Reply};
use crate::transcode::Transcoder;
use crate::whatsapp::message::InboundMessage;
use crate::whatsapp::{Presence, Transport};

/// Settings that shape command handling.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Trigger prefix.
    pub prefix: String,
    /// How long the typing indicator stays on.
    pub presence_delay: Duration,
    /// Parent directory for per-request scratch directories.
    pub scratch_root: PathBuf,
}

/// Command pipeline shared by all message tasks.
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    transcoder: Arc<dyn Transcoder>,
    uptime: Uptime,
    settings: PipelineSettings,
}

impl Pipeline {
    /// Create a pipeline.
    pub fn new(
        transport: Arc<dyn Transport>,
        transcoder: Arc<dyn Transcoder>,
        uptime: Uptime,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            transport,
            transcoder,
            uptime,
            settings,
        }
    }

    /// Derive the command request for a message, or `None` if the message
    /// must be ignored.
    pub fn accept(&self, msg: &InboundMessage) -> Option<CommandRequest> {
        if msg.key.from_me {
            return None;
        }
        let content = msg.content.as_ref()?;
        let Some((command, args)) = parse_command(content.display_text(), &self.settings.prefix)
        else {
            debug!(kind = content.kind_name(), "not a command, skipping");
            return None;
        };
        Some(CommandRequest {
            command,
            args,
            chat: msg.chat().to_owned(),
            sender: msg.sender().to_owned(),
            quoted: content.quoted().cloned(),
        })
    }

    /// Run one message through the pipeline.
    pub async fn handle(&self, msg: InboundMessage) {
        let Some(request) = self.accept(&msg) else {
            return;
        };
        info!(
            command = %request.command,
            chat = %request.chat,
            sender = %request.sender,
            "command received"
        );

        self.show_typing(&request.chat).await;
        let reply = self.dispatch(&request).await;
        self.deliver(&request.chat, reply).await;
    }

    /// Route a request to its handler.
    pub async fn dispatch(&self, request: &CommandRequest) -> Reply {
        match request.command.as_str() {
            "runtime" => handle_runtime(&self.uptime),
            "s" => {
                sticker::handle_sticker(
                    &*self.transport,
                    &*self.transcoder,
                    &self.settings.scratch_root,
                    request.quoted.as_ref(),
                )
                .await
            }
            "all" => {
                mention_all::handle_all(
                    &*self.transport,
                    &request.chat,
                    &request.sender,
                    &request.args,
                    &self.settings.prefix,
                )
                .await
            }
            other => unknown_command(other),
        }
    }

    /// Best-effort typing indicator. Failures never reach the user.
    async fn show_typing(&self, chat: &str) {
        if let Err(e) = self.transport.set_presence(chat, Presence::Composing).await {
            warn!(error = %e, chat, "failed to send composing presence");
            return;
        }
        tokio::time::sleep(self.settings.presence_delay).await;
        if let Err(e) = self.transport.set_presence(chat, Presence::Paused).await {
            warn!(error = %e, chat, "failed to send paused presence");
        }
    }

    /// Send a reply, falling back to an error text if delivery fails.
    async fn deliver(&self, chat: &str, reply: Reply) {
        let fallback = reply.failure_text();
        let result = match reply {
            Reply::Text { text, mentions } => {
                self.transport.send_text(chat, &text, &mentions).await
            }
            Reply::Sticker { webp } => self.transport.send_sticker(chat, webp).await,
        };

        let Err(e) = result else {
            debug!(chat, "reply delivered");
            return;
        };
        warn!(error = %e, chat, "failed to deliver reply");

        if let Some(text) = fallback {
            if let Err(e) = self.transport.send_text(chat, text, &[]).await {
                warn!(error = %e, chat, "failed to deliver error reply");
            }
        }
    }
}
