//! Persistence of the WhatsApp authentication blob.
//!
//! The blob is opaque to the bot. It is loaded once at startup and rewritten
//! on every credentials-update event. Logging out never deletes it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::whatsapp::Credentials;

/// Errors from a session store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Filesystem access failed.
    #[error("session file {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Stored credentials are not valid JSON.
    #[error("corrupt session file {path}: {source}")]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Load/save contract for authentication material.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load stored credentials. `Ok(None)` means the account was never paired.
    async fn load(&self) -> Result<Option<Credentials>, SessionError>;

    /// Replace the stored credentials.
    async fn save(&self, credentials: &Credentials) -> Result<(), SessionError>;
}

/// JSON file store, written atomically via a sibling temp file and rename.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Create a store backed by `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the credentials file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<Credentials>, SessionError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        let creds = serde_json::from_slice(&contents).map_err(|source| SessionError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "credentials loaded");
        Ok(Some(creds))
    }

    async fn save(&self, credentials: &Credentials) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let bytes = serde_json::to_vec_pretty(credentials).map_err(|source| {
            SessionError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), "credentials saved");
        Ok(())
    }
}
