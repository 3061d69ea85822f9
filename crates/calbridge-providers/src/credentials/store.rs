//! Persistence for the authorization token.
//!
//! [`FileTokenStore`] keeps the token as a JSON blob at a well-known path and
//! replaces it atomically, so a concurrent reader sees either the previous
//! token or the new one, never a partial write. [`MemoryTokenStore`] backs
//! tests and ephemeral runs.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

use super::token::AuthorizationToken;

/// Durable storage for a single authorization token.
pub trait TokenStore: Send + Sync {
    /// Loads the persisted token, `None` if nothing has been stored.
    fn load(&self) -> ProviderResult<Option<AuthorizationToken>>;

    /// Replaces the persisted token.
    fn save(&self, token: &AuthorizationToken) -> ProviderResult<()>;

    /// Removes the persisted token. Clearing an empty store is not an error.
    fn clear(&self) -> ProviderResult<()>;
}

/// File-backed token store.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Creates a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the token file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> ProviderResult<Option<AuthorizationToken>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no token file");
                return Ok(None);
            }
            Err(e) => {
                return Err(
                    ProviderError::configuration(format!("failed to read token file: {}", e))
                        .with_source(e),
                );
            }
        };

        let token = serde_json::from_str(&content).map_err(|e| {
            ProviderError::configuration(format!("failed to parse token file: {}", e))
        })?;
        Ok(Some(token))
    }

    fn save(&self, token: &AuthorizationToken) -> ProviderResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::persistence(format!("failed to create token directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(token)
            .map_err(|e| ProviderError::internal(format!("failed to serialize token: {}", e)))?;

        let temp_path = self.temp_path();
        write_private(&temp_path, content.as_bytes()).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            ProviderError::persistence(format!("failed to write token file: {}", e))
                .with_source(e)
        })?;

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            ProviderError::persistence(format!("failed to replace token file: {}", e))
        })?;

        debug!(path = %self.path.display(), "saved token");
        Ok(())
    }

    fn clear(&self) -> ProviderResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "cleared stored token");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProviderError::persistence(format!(
                "failed to remove token file: {}",
                e
            ))),
        }
    }
}

/// Writes `content` to a fresh file readable only by the owner (0600 on Unix).
///
/// A leftover file at `path` is removed first, since the mode only applies
/// when the file is created.
fn write_private(path: &Path, content: &[u8]) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

/// In-memory token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<AuthorizationToken>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `token`.
    pub fn with_token(token: AuthorizationToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }

    fn slot(&self) -> ProviderResult<std::sync::MutexGuard<'_, Option<AuthorizationToken>>> {
        self.token
            .lock()
            .map_err(|_| ProviderError::internal("token store lock poisoned"))
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> ProviderResult<Option<AuthorizationToken>> {
        Ok(self.slot()?.clone())
    }

    fn save(&self, token: &AuthorizationToken) -> ProviderResult<()> {
        *self.slot()? = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> ProviderResult<()> {
        *self.slot()? = None;
        Ok(())
    }
}
