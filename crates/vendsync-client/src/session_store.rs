use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use vendsync_core::error::AppError;
use vendsync_core::models::SessionCookie;
use vendsync_core::traits::SessionStore;

/// Stores each source's cookies as `<dir>/<source>-<hash>.json`.
///
/// The readable prefix is the source name reduced to `[A-Za-z0-9_-]`; the
/// hash of the full name keeps distinct sources apart after that reduction.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, source: &str) -> PathBuf {
        let file: String = source
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let digest = Sha256::digest(source.as_bytes());
        let hash: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{file}-{hash}.json"))
    }
}

impl SessionStore for FileSessionStore {
    async fn load(&self, source: &str) -> Result<Option<Vec<SessionCookie>>, AppError> {
        let path = self.path_for(source);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::Generic(format!(
                    "Cannot read session file {}: {e}",
                    path.display()
                )));
            }
        };

        match serde_json::from_str(&raw) {
            Ok(cookies) => Ok(Some(cookies)),
            Err(e) => {
                // A damaged file only costs one extra login.
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
                Ok(None)
            }
        }
    }

    async fn save(&self, source: &str, cookies: &[SessionCookie]) -> Result<(), AppError> {
        let io_err = |e: std::io::Error| {
            AppError::Generic(format!("Cannot write session for {source}: {e}"))
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let dir = self.dir.clone();
        let path = self.path_for(source);
        let json = serde_json::to_vec_pretty(cookies)?;
        // Each save gets its own temp file, so concurrent saves never share one.
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&json)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Generic(format!("Session writer for {source} panicked: {e}")))?
        .map_err(io_err)?;

        tracing::debug!(%source, cookies = cookies.len(), "Session state saved");
        Ok(())
    }
}
