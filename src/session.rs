//! Client login sessions.
//!
//! A [`Session`] hands out the bearer token and is the reset callback the
//! sync controller invokes when the server rejects the token.
//! [`FileSession`] persists `{base_url, token, email}` as JSON and deletes
//! the file on invalidation.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub trait Session: Send + Sync {
    /// The bearer token, if logged in.
    fn token(&self) -> Option<String>;

    /// Forgets the credential. Called on any `Unauthorized` response.
    fn invalidate(&self);

    fn is_valid(&self) -> bool {
        self.token().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub base_url: String,
    pub token: String,
    pub email: String,
}

pub struct FileSession {
    path: PathBuf,
    data: RwLock<Option<SessionData>>,
}

impl FileSession {
    /// Loads the session at `path`. A missing file is a logged-out session.
    pub fn load(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read session file: {}", path.display()))?;
            match serde_json::from_str::<SessionData>(&content) {
                Ok(data) => Some(data),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable session file");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self {
            path: path.to_path_buf(),
            data: RwLock::new(data),
        })
    }

    /// Writes a fresh session to `path`.
    pub fn save(path: &Path, data: SessionData) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&data)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session file: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            data: RwLock::new(Some(data)),
        })
    }

    pub fn data(&self) -> Option<SessionData> {
        self.data.read().ok().and_then(|d| d.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Session for FileSession {
    fn token(&self) -> Option<String> {
        self.data().map(|d| d.token)
    }

    fn invalidate(&self) {
        if let Ok(mut data) = self.data.write() {
            *data = None;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::info!(path = %self.path.display(), "session cleared"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "failed to remove session file"),
        }
    }
}

/// A token held in memory only; for tests and one-shot tooling.
pub struct StaticSession {
    token: RwLock<Option<String>>,
}

impl StaticSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl Session for StaticSession {
    fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    fn invalidate(&self) {
        if let Ok(mut token) = self.token.write() {
            *token = None;
        }
    }
}
