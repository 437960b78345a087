//! `runtime`: how long the bot has been up.

use std::time::{Duration, Instant};

use super::Reply;

/// Process-wide start instant, captured once.
#[derive(Debug, Clone, Copy)]
pub struct Uptime {
    started: Instant,
}

impl Uptime {
    /// Anchor at the current instant.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Time elapsed since the anchor.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Render as `H jam M menit S detik`. Hours never roll over into days.
pub fn format_runtime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{hours} jam {minutes} menit {seconds} detik")
}

/// Handle `runtime`.
pub fn handle_runtime(uptime: &Uptime) -> Reply {
    Reply::text(format!("⏱️ Runtime: {}", format_runtime(uptime.elapsed())))
}
