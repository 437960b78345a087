//! Configuration loading and runtime paths.
//!
//! Loads `config.toml` from the data directory (`~/.tukang/`) or from
//! `$TUKANG_CONFIG_PATH`. Environment variables override file values; file
//! values override defaults. A missing file yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::whatsapp::client::DEFAULT_BRIDGE_PORT;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TUKANG_CONFIG_PATH";

// ── Top-level config ────────────────────────────────────────────

/// Top-level bot configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command pipeline settings.
    pub bot: BotConfig,
    /// WhatsApp bridge sidecar settings.
    pub bridge: BridgeConfig,
    /// Reconnect backoff policy.
    pub reconnect: ReconnectConfig,
    /// Sticker conversion settings.
    pub sticker: StickerConfig,
}

impl Config {
    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Reject values that parse but cannot run.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty prefix (no message could ever match) or
    /// a zero event buffer.
    pub fn validate(&self) -> Result<()> {
        if self.bot.prefix.is_empty() {
            anyhow::bail!("bot.prefix must not be empty");
        }
        if self.bot.channel_buffer_size == 0 {
            anyhow::bail!("bot.channel_buffer_size must be at least 1");
        }
        Ok(())
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests never touch the process environment.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("TUKANG_BRIDGE_URL") {
            self.bridge.url = v;
        }
        if let Some(v) = env("TUKANG_PREFIX") {
            if v.is_empty() {
                tracing::warn!(var = "TUKANG_PREFIX", "ignoring empty prefix override");
            } else {
                self.bot.prefix = v;
            }
        }
        if let Some(v) = env("TUKANG_LOG_LEVEL") {
            self.bot.log_level = v;
        }
        if let Some(v) = env("TUKANG_FFMPEG_PATH") {
            self.sticker.ffmpeg_path = v;
        }
        if let Some(v) = env("TUKANG_MANAGE_BRIDGE") {
            match v.parse() {
                Ok(flag) => self.bridge.manage_container = flag,
                Err(_) => tracing::warn!(
                    var = "TUKANG_MANAGE_BRIDGE",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }
}

/// Load configuration with precedence: env vars > TOML file > defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed, or if
/// the resulting values fail [`Config::validate`].
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => {
            tracing::info!(path = %path.display(), "loading config from file");
            Config::from_toml(&contents)
                .with_context(|| format!("invalid config at {}", path.display()))?
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            Config::default()
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            ))
        }
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    config
        .validate()
        .with_context(|| format!("invalid config at {}", path.display()))?;
    Ok(config)
}

// ── Sections ────────────────────────────────────────────────────

/// Command pipeline settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Trigger prefix marking a message as a command.
    pub prefix: String,
    /// How long the "typing..." indicator is shown before replying.
    pub presence_delay_ms: u64,
    /// Buffer size of the inbound event channel.
    pub channel_buffer_size: usize,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Grace period for in-flight commands on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: "?".to_owned(),
            presence_delay_ms: 2000,
            channel_buffer_size: 256,
            log_level: "info".to_owned(),
            shutdown_timeout_secs: 10,
        }
    }
}

impl BotConfig {
    /// Presence delay as a [`Duration`].
    pub fn presence_delay(&self) -> Duration {
        Duration::from_millis(self.presence_delay_ms)
    }
}

/// WhatsApp bridge sidecar settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Base URL of the bridge HTTP API.
    pub url: String,
    /// Whether the bot starts the bridge container itself.
    pub manage_container: bool,
    /// Bridge image reference.
    pub image: String,
    /// Container name.
    pub container_name: String,
    /// Published port on 127.0.0.1.
    pub port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: format!("http://127.0.0.1:{DEFAULT_BRIDGE_PORT}"),
            manage_container: false,
            image: "ghcr.io/tukang-bot/wa-bridge:latest".to_owned(),
            container_name: "tukang-wa-bridge".to_owned(),
            port: DEFAULT_BRIDGE_PORT,
        }
    }
}

/// Reconnect backoff policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect after a healthy session.
    pub initial_delay_ms: u64,
    /// Upper bound for the delay.
    pub max_delay_ms: u64,
    /// Growth factor applied after each consecutive failure.
    pub multiplier: u32,
    /// Maximum random extra delay, as a fraction of the base delay.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            multiplier: 2,
            jitter: 0.25,
        }
    }
}

/// Sticker conversion settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StickerConfig {
    /// ffmpeg executable.
    pub ffmpeg_path: String,
    /// Bounding box edge in pixels.
    pub size: u32,
    /// Upper bound for one transcode run.
    pub timeout_secs: u64,
}

impl Default for StickerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_owned(),
            size: 512,
            timeout_secs: 60,
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────

/// Filesystem layout under the data directory.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    /// Data directory root (`~/.tukang/`).
    pub root: PathBuf,
    /// `config.toml`.
    pub config_toml: PathBuf,
    /// `.env` with optional overrides.
    pub env_file: PathBuf,
    /// Persisted WhatsApp credentials.
    pub creds_json: PathBuf,
    /// Rolling log files.
    pub logs_dir: PathBuf,
}

impl RuntimePaths {
    /// Derive all paths from a root directory.
    pub fn from_root(root: PathBuf) -> Self {
        Self {
            config_toml: root.join("config.toml"),
            env_file: root.join(".env"),
            creds_json: root.join("auth").join("creds.json"),
            logs_dir: root.join("logs"),
            root,
        }
    }

    /// Config file to load, honouring `$TUKANG_CONFIG_PATH`.
    pub fn config_file(&self, env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config_toml.clone())
    }
}

/// Resolve the default data directory (`~/.tukang/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".tukang"))
}

/// Resolve [`RuntimePaths`] for the default data directory.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn runtime_paths() -> Result<RuntimePaths> {
    Ok(RuntimePaths::from_root(config_dir()?))
}
