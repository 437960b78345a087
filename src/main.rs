//! Tukang CLI entry point.
//!
//! Provides `start`, `pair`, and `status` subcommands.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

use tukang::bot::{Bot, BotExit};
use tukang::commands::runtime::Uptime;
use tukang::config::{load_config, runtime_paths, Config, RuntimePaths};
use tukang::connection::ConnectionManager;
use tukang::pipeline::{Pipeline, PipelineSettings};
use tukang::session::FileSessionStore;
use tukang::transcode::FfmpegTranscoder;
use tukang::whatsapp::{events, pairing, setup};

/// Tukang, a WhatsApp command bot.
#[derive(Parser)]
#[command(name = "tukang", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Connect to WhatsApp and answer commands until logged out.
    Start,
    /// Make sure the bridge is up and print the current pairing QR.
    Pair,
    /// Show whether the bridge is connected to WhatsApp.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let uptime = Uptime::start();
    let cli = Cli::parse();

    let paths = runtime_paths()?;
    // Optional overrides; a missing .env is normal.
    let _ = dotenvy::from_path(&paths.env_file);
    let config_path = paths.config_file(|key| std::env::var(key).ok());
    let config = load_config(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    match cli.command {
        Command::Start => handle_start(config, paths, uptime).await,
        Command::Pair => handle_pair(config).await,
        Command::Status => handle_status(config).await,
    }
}

/// Run the bot.
async fn handle_start(config: Config, paths: RuntimePaths, uptime: Uptime) -> anyhow::Result<()> {
    let _logging_guard = tukang::logging::init_production(&paths.logs_dir, &config.bot.log_level)?;
    info!(version = env!("CARGO_PKG_VERSION"), "tukang starting");

    let client = setup::prepare_bridge(&config.bridge)
        .await
        .context("WhatsApp bridge is not reachable")?;

    let (event_tx, event_rx) = mpsc::channel(config.bot.channel_buffer_size);
    let listener = events::spawn_event_listener(client.base_url().to_owned(), event_tx);

    let transport = Arc::new(client);
    let pipeline = Arc::new(Pipeline::new(
        transport.clone(),
        Arc::new(FfmpegTranscoder::new(&config.sticker)),
        uptime,
        PipelineSettings {
            prefix: config.bot.prefix.clone(),
            presence_delay: config.bot.presence_delay(),
            scratch_root: std::env::temp_dir(),
        },
    ));
    let sessions = FileSessionStore::new(paths.creds_json.clone());
    info!(path = %sessions.path().display(), "using WhatsApp session file");
    let bot = Bot::new(
        transport,
        Arc::new(sessions),
        pipeline,
        ConnectionManager::new(config.reconnect.clone()),
        Duration::from_secs(config.bot.shutdown_timeout_secs),
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let exit = bot.run(event_rx, shutdown).await?;
    listener.abort();

    match exit {
        BotExit::LoggedOut => {
            anyhow::bail!("WhatsApp session logged out; run `tukang pair` to link again")
        }
        BotExit::Shutdown | BotExit::StreamClosed => {
            info!(?exit, "tukang stopped");
            Ok(())
        }
    }
}

/// Print the pairing QR once.
async fn handle_pair(config: Config) -> anyhow::Result<()> {
    tukang::logging::init_cli(&config.bot.log_level);
    let client = setup::prepare_bridge(&config.bridge).await?;
    let status = client.status().await?;
    if status.connected {
        println!(
            "Already linked as {}",
            status.me.as_deref().unwrap_or("unknown")
        );
        return Ok(());
    }
    let qr = client
        .get_qr()
        .await
        .context("bridge has no pairing QR yet; is `tukang start` running?")?;
    pairing::display_challenge(&qr);
    Ok(())
}

/// Print bridge status.
async fn handle_status(config: Config) -> anyhow::Result<()> {
    tukang::logging::init_cli(&config.bot.log_level);
    let client = tukang::whatsapp::client::WhatsAppClient::new(config.bridge.url.clone());
    if !client.health_check().await {
        println!("bridge: unreachable at {}", client.base_url());
        return Ok(());
    }
    let status = client.status().await?;
    println!("bridge: reachable at {}", client.base_url());
    println!("whatsapp: {}", if status.connected { "connected" } else { "not linked" });
    if let Some(me) = status.me {
        println!("account: {me}");
    }
    Ok(())
}
