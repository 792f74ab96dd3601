//! Device keychain holding the SecretBox master key.
//!
//! The master key never touches disk in plaintext. [`KeychainProvider`]
//! abstracts over the available backends:
//!
//! - **macOS**: Keychain Services via `security-framework`
//! - **Other platforms**: [`FileKeychain`], the master key encrypted under a
//!   device-derived key
//! - **Tests**: [`MemoryKeychain`]
//!
//! The file backend derives its wrapping key from the hostname, the user name
//! and an application salt. Anyone with the same account on the same machine
//! can rebuild it, so it protects against copied files, not a local attacker.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::crypto;
use crate::error::{Result, VaultError};
use crate::fs_util;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Platform-specific secure storage for the device master key.
pub trait KeychainProvider: Send + Sync {
    /// Retrieve the master key.
    ///
    /// Returns [`VaultError::MasterKeyNotFound`] if no key has been stored yet.
    fn get_master_key(&self) -> Result<Vec<u8>>;

    /// Store (or overwrite) the master key.
    fn set_master_key(&self, key: &[u8]) -> Result<()>;

    /// Check whether a master key has been stored.
    fn has_master_key(&self) -> Result<bool>;

    /// Delete the stored master key.
    fn delete_master_key(&self) -> Result<()>;

    /// Short backend name for logs and status output.
    fn backend_name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// File-based fallback
// ---------------------------------------------------------------------------

/// Application salt mixed into the device-derived key material. Changing it
/// orphans every previously stored master key.
const APP_SALT: &[u8; crypto::SALT_LEN] = b"vaultsync-device-keychain-v1\x00\x00\x00\x00";

/// File-based keychain storing the master key under a device-derived key.
///
/// The key file layout (binary):
/// ```text
/// [32 bytes: PBKDF2 salt, random per write]
/// [12 bytes: AES-256-GCM nonce]
/// [remaining: AES-256-GCM ciphertext + 16-byte tag]
/// ```
/// The salt doubles as associated data, so swapping it invalidates the file.
pub struct FileKeychain {
    key_file: PathBuf,
}

impl FileKeychain {
    /// Create a keychain that stores its key at `key_file`.
    pub fn new(key_file: impl Into<PathBuf>) -> Self {
        Self {
            key_file: key_file.into(),
        }
    }

    /// Default key file location: `<data_dir>/master.key`.
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("master.key")
    }

    /// Path of the encrypted key file.
    pub fn path(&self) -> &Path {
        &self.key_file
    }

    fn device_derived_key(salt: &[u8]) -> [u8; crypto::KEY_LEN] {
        let hostname = hostname();
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown-user".into());

        let mut material = Vec::with_capacity(hostname.len() + username.len() + APP_SALT.len());
        material.extend_from_slice(hostname.as_bytes());
        material.extend_from_slice(username.as_bytes());
        material.extend_from_slice(APP_SALT);

        let mut key = [0u8; crypto::KEY_LEN];
        crypto::derive_key_with_salt(&material, salt, &mut key);
        key
    }
}

fn hostname() -> String {
    #[cfg(unix)]
    {
        std::fs::read_to_string("/etc/hostname")
            .map(|s| s.trim().to_string())
            .or_else(|_| std::env::var("HOSTNAME"))
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or_else(|_| "unknown-host".into())
    }

    #[cfg(not(unix))]
    {
        std::env::var("COMPUTERNAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "unknown-host".into())
    }
}

impl KeychainProvider for FileKeychain {
    fn get_master_key(&self) -> Result<Vec<u8>> {
        let data = match std::fs::read(&self.key_file) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::MasterKeyNotFound);
            }
            Err(e) => return Err(e.into()),
        };

        if data.len() < crypto::SALT_LEN + crypto::NONCE_LEN_BYTES + crypto::TAG_LEN {
            return Err(VaultError::DecryptionFailed {
                reason: "master key file is too small or corrupted".into(),
            });
        }

        let (salt, rest) = data.split_at(crypto::SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(crypto::NONCE_LEN_BYTES);

        let mut nonce = [0u8; crypto::NONCE_LEN_BYTES];
        nonce.copy_from_slice(nonce_bytes);

        let device_key = Self::device_derived_key(salt);
        let master_key = crypto::decrypt(&nonce, ciphertext, &device_key, salt)?;

        tracing::debug!(path = %self.key_file.display(), "loaded master key from file keychain");
        Ok(master_key)
    }

    fn set_master_key(&self, key: &[u8]) -> Result<()> {
        let salt = crypto::random_bytes(crypto::SALT_LEN)?;
        let device_key = Self::device_derived_key(&salt);
        let (nonce, ciphertext) = crypto::encrypt(key, &device_key, &salt)?;

        let mut data =
            Vec::with_capacity(crypto::SALT_LEN + crypto::NONCE_LEN_BYTES + ciphertext.len());
        data.extend_from_slice(&salt);
        data.extend_from_slice(&nonce);
        data.extend_from_slice(&ciphertext);

        fs_util::atomic_write(&self.key_file, &data).map_err(|e| {
            VaultError::MasterKeyStoreFailed {
                reason: e.to_string(),
            }
        })?;

        tracing::info!(path = %self.key_file.display(), "stored master key in file keychain");
        Ok(())
    }

    fn has_master_key(&self) -> Result<bool> {
        Ok(self.key_file.exists())
    }

    fn delete_master_key(&self) -> Result<()> {
        if fs_util::remove_if_exists(&self.key_file)? {
            tracing::info!(path = %self.key_file.display(), "deleted master key from file keychain");
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

// ---------------------------------------------------------------------------
// In-memory keychain
// ---------------------------------------------------------------------------

/// Process-local keychain. Keys vanish when the value is dropped.
#[derive(Default)]
pub struct MemoryKeychain {
    key: Mutex<Option<Vec<u8>>>,
}

impl MemoryKeychain {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<Vec<u8>>>> {
        self.key
            .lock()
            .map_err(|_| VaultError::Internal("memory keychain lock poisoned".into()))
    }
}

impl KeychainProvider for MemoryKeychain {
    fn get_master_key(&self) -> Result<Vec<u8>> {
        self.slot()?.clone().ok_or(VaultError::MasterKeyNotFound)
    }

    fn set_master_key(&self, key: &[u8]) -> Result<()> {
        *self.slot()? = Some(key.to_vec());
        Ok(())
    }

    fn has_master_key(&self) -> Result<bool> {
        Ok(self.slot()?.is_some())
    }

    fn delete_master_key(&self) -> Result<()> {
        *self.slot()? = None;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// ---------------------------------------------------------------------------
// macOS Keychain Services
// ---------------------------------------------------------------------------

/// `errSecItemNotFound`.
#[cfg(target_os = "macos")]
const MACOS_ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;

/// Master key stored as a generic password in the user's login keychain.
#[cfg(target_os = "macos")]
pub struct MacOSKeychain {
    service_name: String,
    account_name: String,
}

#[cfg(target_os = "macos")]
impl MacOSKeychain {
    const DEFAULT_SERVICE: &'static str = "dev.vaultsync.device";
    const DEFAULT_ACCOUNT: &'static str = "secretbox-master-key";

    pub fn new() -> Self {
        Self::with_names(Self::DEFAULT_SERVICE, Self::DEFAULT_ACCOUNT)
    }

    /// Use custom service and account names, so tests do not share the
    /// production entry.
    pub fn with_names(service: &str, account: &str) -> Self {
        Self {
            service_name: service.to_string(),
            account_name: account.to_string(),
        }
    }
}

#[cfg(target_os = "macos")]
impl Default for MacOSKeychain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "macos")]
impl KeychainProvider for MacOSKeychain {
    fn get_master_key(&self) -> Result<Vec<u8>> {
        use security_framework::passwords::get_generic_password;

        match get_generic_password(&self.service_name, &self.account_name) {
            Ok(data) => {
                tracing::debug!(service = %self.service_name, "loaded master key from macOS keychain");
                Ok(data.to_vec())
            }
            Err(e) if e.code() == MACOS_ERR_SEC_ITEM_NOT_FOUND => {
                Err(VaultError::MasterKeyNotFound)
            }
            Err(e) => Err(VaultError::KeychainUnavailable {
                reason: format!("macOS keychain read failed: {e}"),
            }),
        }
    }

    fn set_master_key(&self, key: &[u8]) -> Result<()> {
        use security_framework::passwords::set_generic_password;

        set_generic_password(&self.service_name, &self.account_name, key).map_err(|e| {
            VaultError::MasterKeyStoreFailed {
                reason: format!("macOS keychain write failed: {e}"),
            }
        })?;

        tracing::info!(service = %self.service_name, "stored master key in macOS keychain");
        Ok(())
    }

    fn has_master_key(&self) -> Result<bool> {
        use security_framework::passwords::get_generic_password;

        match get_generic_password(&self.service_name, &self.account_name) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == MACOS_ERR_SEC_ITEM_NOT_FOUND => Ok(false),
            Err(e) => Err(VaultError::KeychainUnavailable {
                reason: format!("macOS keychain check failed: {e}"),
            }),
        }
    }

    fn delete_master_key(&self) -> Result<()> {
        use security_framework::passwords::delete_generic_password;

        match delete_generic_password(&self.service_name, &self.account_name) {
            Ok(()) => {
                tracing::info!(service = %self.service_name, "deleted master key from macOS keychain");
                Ok(())
            }
            Err(e) if e.code() == MACOS_ERR_SEC_ITEM_NOT_FOUND => Ok(()),
            Err(e) => Err(VaultError::KeychainUnavailable {
                reason: format!("macOS keychain delete failed: {e}"),
            }),
        }
    }

    fn backend_name(&self) -> &'static str {
        "macos-keychain"
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Best available keychain for the current platform.
///
/// `data_dir` locates the encrypted key file for the file fallback and is
/// ignored on macOS.
pub fn platform_keychain(data_dir: &Path) -> Box<dyn KeychainProvider> {
    let _ = &data_dir;

    #[cfg(target_os = "macos")]
    {
        tracing::debug!("using macOS Keychain Services for the master key");
        Box::new(MacOSKeychain::new())
    }
    #[cfg(not(target_os = "macos"))]
    {
        let path = FileKeychain::default_path(data_dir);
        tracing::debug!(path = %path.display(), "using file keychain for the master key");
        Box::new(FileKeychain::new(path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
