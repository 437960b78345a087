//! Connection lifecycle state machine.
//!
//! [`ConnectionManager`] is the only owner of [`ConnectionState`]. It turns
//! bridge lifecycle updates into transitions plus a [`Decision`] for the
//! dispatcher loop, and publishes the current state on a `watch` channel.
//!
//! ```text
//! Connecting ──qr──▶ AwaitingPairing ──connecting/open──▶ Connecting / Open
//! Connecting ──open──▶ Open ──close──▶ Closed(reason)
//! Closed(Recoverable) ──reconnect──▶ Connecting
//! Closed(LoggedOut)   terminal
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::ReconnectConfig;
use crate::whatsapp::events::{ConnectionPhase, ConnectionUpdate};

/// Disconnect status code baileys reports when the device was unlinked.
pub const LOGGED_OUT_STATUS: u16 = 401;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The account was unlinked. Reconnecting would only fail again.
    LoggedOut,
    /// Any other cause: network blip, server restart, stream error.
    Recoverable {
        /// Status code reported by the bridge, if any.
        status_code: Option<u16>,
        /// Human-readable cause, if any.
        message: Option<String>,
    },
}

impl CloseReason {
    /// Classify a disconnect by its status code.
    pub fn classify(status_code: Option<u16>, message: Option<String>) -> Self {
        if status_code == Some(LOGGED_OUT_STATUS) {
            Self::LoggedOut
        } else {
            Self::Recoverable {
                status_code,
                message,
            }
        }
    }

    /// Whether no further connection attempt may be made.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

/// Logical connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Waiting for the operator to scan the pairing QR.
    AwaitingPairing(String),
    /// Session established; messages flow.
    Open,
    /// Session ended.
    Closed(CloseReason),
}

/// What the dispatcher loop must do after an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing beyond the state change.
    Continue,
    /// Show the pairing challenge to the operator.
    DisplayPairing(String),
    /// Open a new session after waiting the given delay.
    Reconnect(Duration),
    /// The account is logged out; stop for good.
    Stop,
}

/// Exponential backoff with additive random jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectConfig,
    attempt: u32,
}

impl Backoff {
    /// Create a backoff starting at the policy's initial delay.
    pub fn new(policy: ReconnectConfig) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay for the next attempt, then advance.
    pub fn next_delay(&mut self) -> Duration {
        let factor = u64::from(self.policy.multiplier.max(1))
            .checked_pow(self.attempt)
            .unwrap_or(u64::MAX);
        let base_ms = self
            .policy
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.policy.max_delay_ms);
        let jitter_cap = fraction_of(base_ms, self.policy.jitter);
        let jitter_ms = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(base_ms.saturating_add(jitter_ms))
    }

    /// Forget previous failures after a healthy session.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// `value * fraction`, with `fraction` clamped to `[0, 1]`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn fraction_of(value: u64, fraction: f64) -> u64 {
    (value as f64 * fraction.clamp(0.0, 1.0)) as u64
}

/// Owner of the connection state machine.
#[derive(Debug)]
pub struct ConnectionManager {
    state_tx: watch::Sender<ConnectionState>,
    backoff: Backoff,
}

impl ConnectionManager {
    /// Create a manager in the `Connecting` state.
    pub fn new(policy: ReconnectConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            state_tx,
            backoff: Backoff::new(policy),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn transition(&self, next: ConnectionState) {
        self.state_tx.send_replace(next);
    }

    /// Apply a lifecycle update from the bridge.
    pub fn handle_update(&mut self, update: &ConnectionUpdate) -> Decision {
        if matches!(self.state(), ConnectionState::Closed(CloseReason::LoggedOut)) {
            warn!(?update, "ignoring lifecycle update after logout");
            return Decision::Continue;
        }

        match update.connection {
            Some(ConnectionPhase::Close) => {
                self.on_close(CloseReason::classify(update.status_code, update.error.clone()))
            }
            Some(ConnectionPhase::Open) => {
                self.backoff.reset();
                self.transition(ConnectionState::Open);
                info!("WhatsApp connection open");
                Decision::Continue
            }
            Some(ConnectionPhase::Connecting) | None => match &update.qr {
                Some(qr) => {
                    self.transition(ConnectionState::AwaitingPairing(qr.clone()));
                    info!("pairing challenge received, waiting for scan");
                    Decision::DisplayPairing(qr.clone())
                }
                None if update.connection.is_some() => {
                    self.transition(ConnectionState::Connecting);
                    Decision::Continue
                }
                None => Decision::Continue,
            },
        }
    }

    /// Record a failed attempt to open a session.
    pub fn connect_failed(&mut self, message: String) -> Decision {
        self.on_close(CloseReason::Recoverable {
            status_code: None,
            message: Some(message),
        })
    }

    fn on_close(&mut self, reason: CloseReason) -> Decision {
        // A duplicate close for an already-closed session must not schedule a
        // second attempt.
        if matches!(self.state(), ConnectionState::Closed(_)) {
            return Decision::Continue;
        }

        let terminal = reason.is_terminal();
        self.transition(ConnectionState::Closed(reason.clone()));
        if terminal {
            error!("WhatsApp session logged out; not reconnecting");
            return Decision::Stop;
        }

        let delay = self.backoff.next_delay();
        warn!(
            ?reason,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "WhatsApp connection closed, reconnecting"
        );
        Decision::Reconnect(delay)
    }

    /// `Closed(Recoverable) → Connecting`, right before a new attempt.
    ///
    /// Returns `false` (and changes nothing) from any other state.
    pub fn begin_reconnect(&mut self) -> bool {
        match self.state() {
            ConnectionState::Closed(reason) if !reason.is_terminal() => {
                self.transition(ConnectionState::Connecting);
                true
            }
            _ => false,
        }
    }
}
