//! Tracing setup for the bot process and the one-shot subcommands.
//!
//! `tukang start` runs for days, so it writes JSON lines to a daily file under
//! `~/.tukang/logs/` (one week kept) and mirrors them to stderr for whoever is
//! watching the terminal. `pair` and `status` only print to stderr.
//!
//! `RUST_LOG` always wins over the `bot.log_level` config value.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix of the rolling log (`tukang.YYYY-MM-DD.log`).
const LOG_FILE_PREFIX: &str = "tukang";

/// Daily files kept before the oldest is removed.
const LOG_RETENTION_DAYS: usize = 7;

/// Keeps the background log writer alive.
///
/// Hold it for the lifetime of the bot; dropping it flushes buffered lines.
pub struct LoggingGuard {
    _writer: WorkerGuard,
}

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install file + stderr logging for `tukang start`.
///
/// # Errors
///
/// Fails if `logs_dir` cannot be created, the rolling file cannot be opened,
/// or another subscriber is already installed.
pub fn init_production(logs_dir: &Path, default_level: &str) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("cannot create logs directory {}", logs_dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(LOG_RETENTION_DAYS)
        .build(logs_dir)
        .with_context(|| format!("cannot open log file in {}", logs_dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter(default_level))
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("a tracing subscriber is already installed")?;

    Ok(LoggingGuard { _writer: guard })
}

/// Install stderr-only logging for `pair` and `status`.
///
/// A subscriber installed earlier in the process is left in place.
pub fn init_cli(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .with_writer(std::io::stderr)
        .try_init();
}
