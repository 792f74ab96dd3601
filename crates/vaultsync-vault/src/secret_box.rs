//! Device-bound sealing of small secrets.
//!
//! [`SecretBox`] seals bytes so that only this device (and, when auxiliary
//! entropy is supplied, only a caller holding the same entropy) can open them.
//! [`KeychainSecretBox`] is the production implementation: a random 256-bit
//! master key lives in a [`KeychainProvider`] and every seal derives a fresh
//! AES-256-GCM key with HKDF-SHA256.
//!
//! Sealed layout (binary):
//! ```text
//! [1 byte:   format version, currently 1]
//! [16 bytes: HKDF salt, random per seal]
//! [12 bytes: AES-256-GCM nonce]
//! [remaining: ciphertext + 16-byte tag]
//! ```
//! The version byte and salt are authenticated as associated data.

use std::sync::Mutex;

use crate::crypto;
use crate::error::{Result, VaultError};
use crate::keychain::KeychainProvider;

/// Current sealed-format version.
const FORMAT_VERSION: u8 = 1;

/// Per-seal HKDF salt length.
pub const SEAL_SALT_LEN: usize = 16;

/// Bytes added by sealing on top of the plaintext length.
pub const SEAL_OVERHEAD: usize = 1 + SEAL_SALT_LEN + crypto::NONCE_LEN_BYTES + crypto::TAG_LEN;

const HKDF_INFO: &[u8] = b"vaultsync-secretbox-v1";

/// Seal and open byte strings with a device-bound key.
pub trait SecretBox: Send + Sync {
    /// Seal `plaintext`. When `aux_entropy` is given, the same bytes must be
    /// supplied to [`open`](SecretBox::open).
    fn seal(&self, plaintext: &[u8], aux_entropy: Option<&[u8]>) -> Result<Vec<u8>>;

    /// Open bytes produced by [`seal`](SecretBox::seal).
    ///
    /// Fails with [`VaultError::DecryptionFailed`] for tampered data, a
    /// different device key, or mismatched auxiliary entropy.
    fn open(&self, sealed: &[u8], aux_entropy: Option<&[u8]>) -> Result<Vec<u8>>;

    /// Name of the content cipher, recorded in `VaultBlob::alg`.
    fn algorithm(&self) -> &'static str {
        "AES-256-GCM"
    }
}

/// [`SecretBox`] keyed by a master key held in the device keychain.
pub struct KeychainSecretBox {
    keychain: Box<dyn KeychainProvider>,
    cached_key: Mutex<Option<Vec<u8>>>,
}

impl KeychainSecretBox {
    pub fn new(keychain: Box<dyn KeychainProvider>) -> Self {
        Self {
            keychain,
            cached_key: Mutex::new(None),
        }
    }

    /// Name of the keychain backend holding the master key.
    pub fn backend_name(&self) -> &'static str {
        self.keychain.backend_name()
    }

    /// Load the master key, creating and storing one when `create` is set
    /// and none exists yet.
    fn master_key(&self, create: bool) -> Result<Vec<u8>> {
        let mut cached = self
            .cached_key
            .lock()
            .map_err(|_| VaultError::Internal("secret box key cache poisoned".into()))?;

        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        let key = match self.keychain.get_master_key() {
            Ok(key) => key,
            Err(VaultError::MasterKeyNotFound) if create => {
                let key = crypto::random_bytes(crypto::KEY_LEN)?;
                self.keychain.set_master_key(&key)?;
                tracing::info!(
                    backend = self.keychain.backend_name(),
                    "generated new device master key"
                );
                key
            }
            Err(e) => return Err(e),
        };

        if key.len() != crypto::KEY_LEN {
            return Err(VaultError::DecryptionFailed {
                reason: format!("master key has invalid length {}", key.len()),
            });
        }

        *cached = Some(key.clone());
        Ok(key)
    }

    fn message_key(master: &[u8], salt: &[u8], aux: Option<&[u8]>) -> Result<[u8; crypto::KEY_LEN]> {
        let mut ikm = Vec::with_capacity(master.len() + aux.map_or(0, <[u8]>::len));
        ikm.extend_from_slice(master);
        let marker: &[u8] = match aux {
            Some(aux) => {
                ikm.extend_from_slice(aux);
                &[1]
            }
            None => &[0],
        };
        crypto::hkdf_sha256(&ikm, salt, &[HKDF_INFO, marker])
    }
}

impl SecretBox for KeychainSecretBox {
    fn seal(&self, plaintext: &[u8], aux_entropy: Option<&[u8]>) -> Result<Vec<u8>> {
        let master = self.master_key(true)?;
        let salt = crypto::random_bytes(SEAL_SALT_LEN)?;
        let key = Self::message_key(&master, &salt, aux_entropy)?;

        let mut header = Vec::with_capacity(1 + SEAL_SALT_LEN);
        header.push(FORMAT_VERSION);
        header.extend_from_slice(&salt);

        let (nonce, ciphertext) = crypto::encrypt(plaintext, &key, &header)?;

        let mut out = Vec::with_capacity(header.len() + nonce.len() + ciphertext.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, sealed: &[u8], aux_entropy: Option<&[u8]>) -> Result<Vec<u8>> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(VaultError::DecryptionFailed {
                reason: format!("sealed data too short ({} bytes)", sealed.len()),
            });
        }
        if sealed[0] != FORMAT_VERSION {
            return Err(VaultError::DecryptionFailed {
                reason: format!("unsupported sealed format version {}", sealed[0]),
            });
        }

        let master = match self.master_key(false) {
            Ok(key) => key,
            Err(VaultError::MasterKeyNotFound) => {
                return Err(VaultError::DecryptionFailed {
                    reason: "no device master key is available".into(),
                });
            }
            Err(e) => return Err(e),
        };

        let (header, rest) = sealed.split_at(1 + SEAL_SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(crypto::NONCE_LEN_BYTES);
        let mut nonce = [0u8; crypto::NONCE_LEN_BYTES];
        nonce.copy_from_slice(nonce_bytes);

        let key = Self::message_key(&master, &header[1..], aux_entropy)?;
        crypto::decrypt(&nonce, ciphertext, &key, header)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
