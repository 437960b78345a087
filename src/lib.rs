//! Tukang: a single-account WhatsApp command bot.
//!
//! Talks to WhatsApp through a baileys bridge sidecar, keeps the session
//! alive across disconnects, and answers a handful of `?` commands:
//! uptime, image-to-sticker conversion, and group-wide mentions.
//!
//! See `DESIGN.md` for the architecture.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod connection;
pub mod session;
pub mod whatsapp;

pub mod commands;
pub mod pipeline;
pub mod transcode;

pub mod bot;
