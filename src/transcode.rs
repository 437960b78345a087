//! Out-of-process image transcoding to the WhatsApp sticker format.
//!
//! The sticker handler only depends on [`Transcoder`]; [`FfmpegTranscoder`]
//! shells out to `ffmpeg` with a hard timeout.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::StickerConfig;

/// Maximum number of stderr bytes kept for diagnostics.
const STDERR_TAIL_BYTES: usize = 2048;

/// Errors from a transcode run.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    /// The transcoder binary could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The transcoder exited unsuccessfully.
    #[error("transcoder exited with {status}: {stderr}")]
    Failed {
        /// Exit status description.
        status: String,
        /// Tail of the captured stderr.
        stderr: String,
    },
    /// The transcoder did not finish in time and was killed.
    #[error("transcoder timed out after {seconds}s")]
    Timeout {
        /// Timeout budget in seconds.
        seconds: u64,
    },
}

/// Converts an image file into a sticker file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Read `input`, write a square-bounded, aspect-preserving, lossless WebP
    /// to `output`.
    ///
    /// Success only means the process exited cleanly; callers must still
    /// check that `output` exists.
    async fn to_sticker(&self, input: &Path, output: &Path) -> Result<(), TranscodeError>;
}

/// `ffmpeg`-backed transcoder.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
    size: u32,
    timeout: Duration,
}

impl FfmpegTranscoder {
    /// Build from sticker settings.
    pub fn new(config: &StickerConfig) -> Self {
        Self {
            program: config.ffmpeg_path.clone(),
            size: config.size,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Command-line arguments for one conversion.
    pub fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let scale = format!(
            "scale={size}:{size}:force_original_aspect_ratio=decrease",
            size = self.size
        );
        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
        args.extend(
            [
                "-vf",
                scale.as_str(),
                "-vcodec",
                "libwebp",
                "-lossless",
                "1",
                "-qscale",
                "75",
                "-preset",
                "default",
                "-an",
                "-vsync",
                "0",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(output.into());
        args
    }
}

/// Keep the last `max` bytes of `text`, on a char boundary.
fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len().saturating_sub(max);
    while !text.is_char_boundary(start) {
        start = start.saturating_add(1);
    }
    &text[start..]
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_sticker(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(self.args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program, input = %input.display(), "running transcoder");

        let child = cmd.spawn().map_err(|source| TranscodeError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output_result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;
        let result = match output_result {
            Ok(result) => result.map_err(|source| TranscodeError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(TranscodeError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(TranscodeError::Failed {
                status: result.status.to_string(),
                stderr: tail(&stderr, STDERR_TAIL_BYTES).to_owned(),
            });
        }
        Ok(())
    }
}
