//! Encrypted-at-rest storage for the OAuth refresh token.
//!
//! The token is sealed with the device [`SecretBox`] and written atomically.
//! Reads fail closed: anything that cannot be opened is treated as "no
//! token" and logged, never surfaced as partially decoded data.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, VaultError};
use crate::fs_util;
use crate::secret_box::SecretBox;

/// File name of the sealed refresh token inside the data directory.
pub const REFRESH_TOKEN_FILE: &str = "refresh_token.bin";

/// Largest sealed token file that will be read.
pub const MAX_TOKEN_FILE_BYTES: u64 = 1024 * 1024;

/// Result of inspecting the stored refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A token is stored and opens with this device's key.
    Connected,
    /// A token file exists but cannot be opened.
    TokenUnreadable,
    /// No token is stored.
    NotConnected,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::TokenUnreadable => "token unreadable",
            Self::NotConnected => "not connected",
        }
    }

    /// What the user should do about this status, if anything.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::TokenUnreadable => Some(
                "the stored token cannot be decrypted on this device; disconnect and sign in again",
            ),
            Self::NotConnected => Some("run `vaultsync authorize` to connect"),
            Self::Connected => None,
        }
    }
}

/// Persistent, device-sealed refresh token.
pub struct RefreshTokenStore {
    path: PathBuf,
    secret_box: Arc<dyn SecretBox>,
    write_lock: Mutex<()>,
}

impl RefreshTokenStore {
    /// Store the token at `<data_dir>/refresh_token.bin`.
    pub fn new(data_dir: &Path, secret_box: Arc<dyn SecretBox>) -> Self {
        Self::with_path(data_dir.join(REFRESH_TOKEN_FILE), secret_box)
    }

    pub fn with_path(path: impl Into<PathBuf>, secret_box: Arc<dyn SecretBox>) -> Self {
        Self {
            path: path.into(),
            secret_box,
            write_lock: Mutex::new(()),
        }
    }

    pub fn storage_path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| VaultError::Internal("refresh token lock poisoned".into()))
    }

    /// Seal and persist `token`, replacing any previous one.
    pub fn save(&self, token: &str) -> Result<()> {
        if token.trim().is_empty() {
            return Err(VaultError::InvalidArgument {
                reason: "refresh token must not be empty".into(),
            });
        }

        let sealed = self.secret_box.seal(token.as_bytes(), None)?;

        let _guard = self.lock()?;
        fs_util::atomic_write(&self.path, &sealed)?;

        tracing::info!(path = %self.path.display(), "stored refresh token");
        Ok(())
    }

    /// Load the stored token. Returns `None` when nothing usable is stored.
    pub fn load(&self) -> Option<String> {
        match self.try_load() {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "stored refresh token is unreadable"
                );
                None
            }
        }
    }

    /// Delete the stored token. Returns whether a token file existed.
    pub fn delete(&self) -> Result<bool> {
        let _guard = self.lock()?;
        let existed = fs_util::remove_if_exists(&self.path)?;
        if existed {
            tracing::info!(path = %self.path.display(), "deleted refresh token");
        }
        Ok(existed)
    }

    /// Inspect the stored token without returning it.
    pub fn diagnose(&self) -> ConnectionStatus {
        if !self.path.exists() {
            return ConnectionStatus::NotConnected;
        }
        match self.try_load() {
            Ok(Some(_)) => ConnectionStatus::Connected,
            Ok(None) | Err(_) => ConnectionStatus::TokenUnreadable,
        }
    }

    fn try_load(&self) -> Result<Option<String>> {
        let _guard = self.lock()?;

        let size = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if size == 0 || size > MAX_TOKEN_FILE_BYTES {
            return Err(VaultError::DecryptionFailed {
                reason: format!("refresh token file has implausible size {size}"),
            });
        }

        let sealed = std::fs::read(&self.path)?;
        let plaintext = self.secret_box.open(&sealed, None)?;
        let token = String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed {
            reason: "refresh token is not valid UTF-8".into(),
        })?;

        if token.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(token))
    }
}
