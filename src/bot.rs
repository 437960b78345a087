//! Dispatcher loop.
//!
//! Consumes the single bridge event stream in arrival order. Lifecycle
//! updates go to the [`ConnectionManager`], credential updates are persisted
//! before the next event is looked at, and each message is handled in its own
//! task so slow commands never hold up the stream.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionManager, ConnectionState, Decision};
use crate::pipeline::Pipeline;
use crate::session::{SessionError, SessionStore};
use crate::whatsapp::events::WhatsAppEvent;
use crate::whatsapp::message::UpsertKind;
use crate::whatsapp::pairing;
use crate::whatsapp::{Credentials, Transport};

/// Why the dispatcher loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotExit {
    /// The account was logged out; the operator must pair again.
    LoggedOut,
    /// A shutdown signal was received.
    Shutdown,
    /// The event stream ended.
    StreamClosed,
}

/// Errors that stop the bot before the loop starts.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Stored credentials could not be loaded.
    #[error("failed to load session: {0}")]
    Session(#[from] SessionError),
}

/// The running bot.
pub struct Bot {
    transport: Arc<dyn Transport>,
    sessions: Arc<dyn SessionStore>,
    pipeline: Arc<Pipeline>,
    manager: ConnectionManager,
    shutdown_grace: Duration,
    tasks: JoinSet<()>,
    reconnect_at: Option<Instant>,
}

impl Bot {
    /// Assemble a bot from its collaborators.
    pub fn new(
        transport: Arc<dyn Transport>,
        sessions: Arc<dyn SessionStore>,
        pipeline: Arc<Pipeline>,
        manager: ConnectionManager,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            transport,
            sessions,
            pipeline,
            manager,
            shutdown_grace,
            tasks: JoinSet::new(),
            reconnect_at: None,
        }
    }

    /// Subscribe to connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe()
    }

    /// Connect and process events until logout, shutdown, or end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error only if the stored session cannot be read at startup.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<WhatsAppEvent>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<BotExit, BotError> {
        let credentials = self.sessions.load().await?;
        if credentials.is_none() {
            info!("no stored session, a pairing QR will be shown");
        }
        self.connect(credentials).await;

        tokio::pin!(shutdown);

        let exit = loop {
            let reconnect_at = self.reconnect_at;
            let reconnect_timer = async move {
                match reconnect_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!("shutdown requested");
                    break BotExit::Shutdown;
                }
                () = reconnect_timer => {
                    self.reconnect_at = None;
                    self.reconnect().await;
                }
                // Reap finished commands before taking more events so the
                // set stays bounded under a steady stream.
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "message task failed");
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("bridge event stream closed");
                        break BotExit::StreamClosed;
                    };
                    if let Some(exit) = self.handle_event(event).await {
                        break exit;
                    }
                }
            }
        };

        self.drain().await;
        Ok(exit)
    }

    /// Process one bridge event. Returns `Some` when the loop must stop.
    async fn handle_event(&mut self, event: WhatsAppEvent) -> Option<BotExit> {
        match event {
            WhatsAppEvent::Creds { creds } => {
                if let Err(e) = self.sessions.save(&creds).await {
                    error!(error = %e, "failed to persist credentials");
                }
                None
            }
            WhatsAppEvent::Connection(update) => {
                let decision = self.manager.handle_update(&update);
                self.apply(decision)
            }
            WhatsAppEvent::Messages { kind, messages } => {
                if kind != UpsertKind::Notify {
                    debug!(?kind, count = messages.len(), "ignoring non-notify upsert");
                    return None;
                }
                for msg in messages {
                    let pipeline = Arc::clone(&self.pipeline);
                    self.tasks.spawn(async move { pipeline.handle(msg).await });
                }
                self.reap_finished();
                None
            }
        }
    }

    fn reap_finished(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "message task failed");
            }
        }
    }

    fn apply(&mut self, decision: Decision) -> Option<BotExit> {
        match decision {
            Decision::Continue => None,
            Decision::DisplayPairing(challenge) => {
                pairing::display_challenge(&challenge);
                None
            }
            Decision::Reconnect(delay) => {
                self.reconnect_at = Instant::now().checked_add(delay).or(Some(Instant::now()));
                None
            }
            Decision::Stop => Some(BotExit::LoggedOut),
        }
    }

    async fn connect(&mut self, credentials: Option<Credentials>) {
        if let Err(e) = self.transport.connect(credentials).await {
            warn!(error = %e, "failed to open WhatsApp session");
            let decision = self.manager.connect_failed(e.to_string());
            // A failed connect is never terminal, so this only schedules a retry.
            let _ = self.apply(decision);
        }
    }

    async fn reconnect(&mut self) {
        if !self.manager.begin_reconnect() {
            return;
        }
        info!("reconnecting to WhatsApp");
        let credentials = match self.sessions.load().await {
            Ok(credentials) => credentials,
            Err(e) => {
                error!(error = %e, "failed to reload session, reconnecting without it");
                None
            }
        };
        self.connect(credentials).await;
    }

    /// Give in-flight commands a bounded grace period, then abandon them.
    async fn drain(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        info!(
            pending = self.tasks.len(),
            grace_secs = self.shutdown_grace.as_secs(),
            "waiting for in-flight commands"
        );
        let tasks = &mut self.tasks;
        let finished = tokio::time::timeout(self.shutdown_grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "message task failed");
                }
            }
        })
        .await;
        if finished.is_err() {
            warn!(
                remaining = self.tasks.len(),
                "grace period exceeded, abandoning in-flight commands"
            );
            self.tasks.abort_all();
        }
    }
}
