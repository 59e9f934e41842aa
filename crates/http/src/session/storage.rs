//! Durable token persistence
//!
//! Tokens survive restarts as two string entries under fixed keys. Backends
//! write the pair as a unit so a crash never leaves one half updated.

use campus_core::{CoreError, CoreResult, ErrorContext};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Storage key of the access token
pub const ACCESS_TOKEN_KEY: &str = "token";
/// Storage key of the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// The persisted token pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTokens {
    #[serde(rename = "token", default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(
        rename = "refreshToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh: Option<String>,
}

impl PersistedTokens {
    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

/// Durable key-value store for the token pair
#[cfg_attr(test, mockall::automock)]
pub trait TokenStorage: Send + Sync {
    /// Read the persisted pair; an empty store yields an empty pair
    fn load(&self) -> CoreResult<PersistedTokens>;

    /// Replace the persisted pair
    fn save(&self, tokens: &PersistedTokens) -> CoreResult<()>;

    /// Remove both entries
    fn clear(&self) -> CoreResult<()>;
}

/// In-process storage, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with a token pair
    pub fn with_tokens(access: Option<&str>, refresh: Option<&str>) -> Self {
        let storage = Self::new();
        {
            let mut entries = storage.lock();
            if let Some(access) = access {
                entries.insert(ACCESS_TOKEN_KEY.to_string(), access.to_string());
            }
            if let Some(refresh) = refresh {
                entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh.to_string());
            }
        }
        storage
    }

    /// Raw entry lookup
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> CoreResult<PersistedTokens> {
        let entries = self.lock();
        Ok(PersistedTokens {
            access: entries.get(ACCESS_TOKEN_KEY).cloned(),
            refresh: entries.get(REFRESH_TOKEN_KEY).cloned(),
        })
    }

    fn save(&self, tokens: &PersistedTokens) -> CoreResult<()> {
        let mut entries = self.lock();
        for (key, value) in [
            (ACCESS_TOKEN_KEY, &tokens.access),
            (REFRESH_TOKEN_KEY, &tokens.refresh),
        ] {
            match value {
                Some(value) => entries.insert(key.to_string(), value.clone()),
                None => entries.remove(key),
            };
        }
        Ok(())
    }

    fn clear(&self) -> CoreResult<()> {
        let mut entries = self.lock();
        entries.remove(ACCESS_TOKEN_KEY);
        entries.remove(REFRESH_TOKEN_KEY);
        Ok(())
    }
}

/// JSON file storage
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// reader sees either the old pair or the new one.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> CoreResult<PersistedTokens> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PersistedTokens::default()),
            Err(e) => Err(CoreError::io_error(format!(
                "Failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn save(&self, tokens: &PersistedTokens) -> CoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let temp = self.temp_path();
        std::fs::write(&temp, serde_json::to_vec(tokens)?)
            .with_context(|| format!("Failed to write {}", temp.display()))
            .map_err(CoreError::io_error)?;

        // Tokens are credentials: owner read/write only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&temp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))
            .map_err(CoreError::io_error)?;
        debug!(path = %self.path.display(), "persisted token pair");
        Ok(())
    }

    fn clear(&self) -> CoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
