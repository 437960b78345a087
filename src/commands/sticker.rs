//! `s`: turn a quoted image into a sticker.
//!
//! Each request works in its own temporary directory, removed when the
//! [`tempfile::TempDir`] handle drops, on success and on every error path.

use std::path::Path;

use tracing::{error, info};

use super::Reply;
use crate::transcode::{TranscodeError, Transcoder};
use crate::whatsapp::message::{ImageContent, MessageContent};
use crate::whatsapp::{Transport, WhatsAppError};

/// Sent when the command does not reply to anything.
pub const NO_QUOTE: &str = "❌ Reply gambar untuk dijadikan stiker";

/// Sent when the quoted message is not an image.
pub const NOT_IMAGE: &str = "❌ Hanya bisa convert gambar jadi stiker";

/// Sent when the transcoder fails or times out.
pub const TRANSCODE_FAILED: &str = "⚠️ Gagal convert ke WebP (ffmpeg error)";

/// Sent when the transcoder succeeded but wrote nothing.
pub const NO_OUTPUT: &str = "⚠️ Tidak ada file output.webp";

/// Sent for any other failure while building or sending the sticker.
pub const FAILED: &str = "⚠️ Terjadi kesalahan saat membuat stiker";

/// Input file name inside the per-request directory.
const INPUT_FILE: &str = "input.jpg";

/// Output file name inside the per-request directory.
const OUTPUT_FILE: &str = "output.webp";

/// Failures while producing a sticker.
#[derive(Debug, thiserror::Error)]
pub enum StickerError {
    /// The quoted image could not be downloaded.
    #[error("media download failed: {0}")]
    Download(#[from] WhatsAppError),
    /// The scratch directory or files could not be written or read.
    #[error("scratch file error: {0}")]
    Io(#[from] std::io::Error),
    /// The transcoder failed.
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    /// The transcoder exited cleanly without producing output.
    #[error("transcoder produced no output file")]
    MissingOutput,
}

impl StickerError {
    /// User-facing text for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Transcode(_) => TRANSCODE_FAILED,
            Self::MissingOutput => NO_OUTPUT,
            Self::Download(_) | Self::Io(_) => FAILED,
        }
    }
}

/// Handle `s`.
pub async fn handle_sticker(
    transport: &dyn Transport,
    transcoder: &dyn Transcoder,
    scratch_root: &Path,
    quoted: Option<&MessageContent>,
) -> Reply {
    let Some(quoted) = quoted else {
        return Reply::text(NO_QUOTE);
    };
    let MessageContent::Image(image) = quoted else {
        return Reply::text(NOT_IMAGE);
    };

    match make_sticker(transport, transcoder, scratch_root, image).await {
        Ok(webp) => Reply::Sticker { webp },
        Err(e) => {
            error!(error = %e, "sticker conversion failed");
            Reply::text(e.user_message())
        }
    }
}

/// Download, transcode, and read back the sticker bytes.
pub async fn make_sticker(
    transport: &dyn Transport,
    transcoder: &dyn Transcoder,
    scratch_root: &Path,
    image: &ImageContent,
) -> Result<Vec<u8>, StickerError> {
    let media = transport.download_media(image).await?;
    info!(size = media.len(), "quoted image downloaded");

    let workdir = tempfile::Builder::new()
        .prefix("tukang-sticker-")
        .tempdir_in(scratch_root)?;
    let input = workdir.path().join(INPUT_FILE);
    let output = workdir.path().join(OUTPUT_FILE);

    tokio::fs::write(&input, &media).await?;
    transcoder.to_sticker(&input, &output).await?;

    if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
        return Err(StickerError::MissingOutput);
    }
    let webp = tokio::fs::read(&output).await?;
    info!(size = webp.len(), "sticker encoded");
    Ok(webp)
}
