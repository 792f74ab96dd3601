//! Vault envelope management.
//!
//! [`VaultEnvelopeManager`] turns vault plaintext into a [`SealedVault`]: the
//! device-sealed ciphertext plus the [`VaultBlob`], [`KeyEnvelope`] and
//! [`VaultMeta`] that describe it on the wire. It also owns the local
//! ciphertext file and enforces its size bounds on every read and write.
//!
//! Protection comes in two explicit modes. When the passkey capability yields
//! a secret, it is mixed into the seal as auxiliary entropy
//! ([`ProtectionMode::SecretBound`]). When it does not, the vault is sealed
//! with the device key alone ([`ProtectionMode::FallbackUnbound`]) and the
//! envelope's `kek_scheme` records that.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::crypto;
use crate::error::{Result, VaultError};
use crate::fs_util;
use crate::model::{
    KEK_SCHEME_FALLBACK_UNBOUND, KEK_SCHEME_SECRET_BOUND, KeyEnvelope, VaultBlob, VaultMeta,
};
use crate::passkey::{PasskeySecret, PasskeySecretProvider};
use crate::secret_box::SecretBox;

/// File name of the local vault ciphertext inside the data directory.
pub const VAULT_FILE: &str = "vault.bin";

/// Smallest accepted local vault ciphertext.
pub const MIN_VAULT_BYTES: u64 = 16;

/// Largest accepted local vault ciphertext.
pub const MAX_VAULT_BYTES: u64 = 64 * 1024;

/// How a vault ciphertext is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionMode {
    /// Sealed with the device key and a passkey-derived secret.
    SecretBound,
    /// Sealed with the device key only.
    FallbackUnbound,
}

impl ProtectionMode {
    pub fn kek_scheme(&self) -> &'static str {
        match self {
            Self::SecretBound => KEK_SCHEME_SECRET_BOUND,
            Self::FallbackUnbound => KEK_SCHEME_FALLBACK_UNBOUND,
        }
    }

    /// Recover the mode from a `kek_scheme` label. Unknown labels yield `None`.
    pub fn from_kek_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            KEK_SCHEME_SECRET_BOUND => Some(Self::SecretBound),
            KEK_SCHEME_FALLBACK_UNBOUND => Some(Self::FallbackUnbound),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProtectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SecretBound => f.write_str("secret-bound"),
            Self::FallbackUnbound => f.write_str("fallback-unbound"),
        }
    }
}

/// Protection secret obtained from the passkey capability.
pub enum ProtectionSecret {
    Bound(Vec<u8>),
    Unbound { reason: String },
}

impl ProtectionSecret {
    pub fn mode(&self) -> ProtectionMode {
        match self {
            Self::Bound(_) => ProtectionMode::SecretBound,
            Self::Unbound { .. } => ProtectionMode::FallbackUnbound,
        }
    }

    fn aux_entropy(&self) -> Option<&[u8]> {
        match self {
            Self::Bound(secret) => Some(secret),
            Self::Unbound { .. } => None,
        }
    }
}

impl std::fmt::Debug for ProtectionSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bound(_) => f.write_str("Bound(<redacted>)"),
            Self::Unbound { reason } => f
                .debug_struct("Unbound")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// A freshly sealed vault and its wire description.
#[derive(Debug, Clone)]
pub struct SealedVault {
    pub ciphertext: Vec<u8>,
    pub blob: VaultBlob,
    pub envelope: KeyEnvelope,
    pub meta: VaultMeta,
    pub mode: ProtectionMode,
}

impl SealedVault {
    /// base64url SHA-256 of the ciphertext.
    pub fn fingerprint(&self) -> &str {
        &self.meta.blob_sha256_b64
    }
}

/// base64url SHA-256 fingerprint of a vault ciphertext.
pub fn fingerprint(ciphertext: &[u8]) -> String {
    crypto::base64url_encode(&crypto::sha256(ciphertext))
}

/// Check a ciphertext size against the accepted bounds.
pub fn classify_size(path: &Path, size: u64) -> Result<()> {
    if size == 0 {
        return Err(VaultError::VaultEmpty {
            path: path.to_path_buf(),
        });
    }
    if size < MIN_VAULT_BYTES {
        return Err(VaultError::VaultTooSmall {
            size,
            min: MIN_VAULT_BYTES,
        });
    }
    if size > MAX_VAULT_BYTES {
        return Err(VaultError::VaultTooLarge {
            size,
            max: MAX_VAULT_BYTES,
        });
    }
    Ok(())
}

/// Seals vault plaintext and manages the local ciphertext file.
pub struct VaultEnvelopeManager {
    secret_box: Arc<dyn SecretBox>,
    vault_path: PathBuf,
    device_id: String,
    io_lock: Mutex<()>,
}

impl VaultEnvelopeManager {
    /// Manage `<data_dir>/vault.bin`, stamping revisions with `device_id`.
    pub fn new(data_dir: &Path, device_id: impl Into<String>, secret_box: Arc<dyn SecretBox>) -> Self {
        Self {
            secret_box,
            vault_path: data_dir.join(VAULT_FILE),
            device_id: device_id.into(),
            io_lock: Mutex::new(()),
        }
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.io_lock
            .lock()
            .map_err(|_| VaultError::Internal("vault file lock poisoned".into()))
    }

    /// Ask the passkey capability for a protection secret.
    ///
    /// Lack of support is a logged fallback, not an error. Cancellation and
    /// real failures propagate.
    pub async fn obtain_secret(
        &self,
        provider: &dyn PasskeySecretProvider,
    ) -> Result<ProtectionSecret> {
        match provider.create_secret().await? {
            PasskeySecret::Secret(secret) if !secret.is_empty() => {
                tracing::info!(len = secret.len(), "passkey returned a protection secret");
                Ok(ProtectionSecret::Bound(secret))
            }
            PasskeySecret::Secret(_) => {
                tracing::warn!("passkey returned an empty secret, using device-only protection");
                Ok(ProtectionSecret::Unbound {
                    reason: "passkey returned an empty secret".into(),
                })
            }
            PasskeySecret::Unavailable { reason } => {
                tracing::warn!(reason = %reason, "passkey secret unavailable, using device-only protection");
                Ok(ProtectionSecret::Unbound { reason })
            }
        }
    }

    /// Seal `plaintext` under `secret` and describe the result.
    pub fn encrypt_vault(&self, plaintext: &[u8], secret: &ProtectionSecret) -> Result<SealedVault> {
        let ciphertext = self.secret_box.seal(plaintext, secret.aux_entropy())?;
        classify_size(&self.vault_path, ciphertext.len() as u64)?;

        let mode = secret.mode();
        let blob = VaultBlob {
            ciphertext_b64: crypto::base64url_encode(&ciphertext),
            nonce_b64: String::new(),
            aad_b64: String::new(),
            alg: self.secret_box.algorithm().to_string(),
        };
        let envelope = KeyEnvelope {
            kek_scheme: mode.kek_scheme().to_string(),
            ..KeyEnvelope::default()
        };
        let meta = VaultMeta::new_now(&self.device_id, fingerprint(&ciphertext));

        tracing::debug!(
            plaintext_len = plaintext.len(),
            ciphertext_len = ciphertext.len(),
            mode = %mode,
            "sealed vault"
        );

        Ok(SealedVault {
            ciphertext,
            blob,
            envelope,
            meta,
            mode,
        })
    }

    /// Open a ciphertext produced by [`encrypt_vault`](Self::encrypt_vault).
    pub fn decrypt_vault(&self, ciphertext: &[u8], secret: &ProtectionSecret) -> Result<Vec<u8>> {
        self.secret_box.open(ciphertext, secret.aux_entropy())
    }

    /// Atomically replace the local ciphertext file.
    pub fn persist_local(&self, ciphertext: &[u8]) -> Result<()> {
        classify_size(&self.vault_path, ciphertext.len() as u64)?;

        let _guard = self.lock()?;
        fs_util::atomic_write(&self.vault_path, ciphertext)?;

        tracing::info!(
            path = %self.vault_path.display(),
            size = ciphertext.len(),
            "persisted local vault"
        );
        Ok(())
    }

    /// Read the local ciphertext, validating its size first.
    pub fn read_local(&self) -> Result<Vec<u8>> {
        let _guard = self.lock()?;

        let size = match std::fs::metadata(&self.vault_path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::VaultMissing {
                    path: self.vault_path.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        classify_size(&self.vault_path, size)?;

        let data = std::fs::read(&self.vault_path)?;
        // The file may change between stat and read; the lock only covers
        // this process.
        classify_size(&self.vault_path, data.len() as u64)?;
        Ok(data)
    }

    /// Remove the local ciphertext. Returns whether a file existed.
    pub fn remove_local(&self) -> Result<bool> {
        let _guard = self.lock()?;
        fs_util::remove_if_exists(&self.vault_path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
