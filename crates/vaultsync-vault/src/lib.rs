//! Device-bound protection for the vaultsync vault and OAuth credential.
//!
//! Everything written to disk by vaultsync passes through this crate. A random
//! master key lives in the OS keychain (or a file-based fallback) and every
//! sealed value derives its own AES-256-GCM key from it.
//!
//! # Modules
//!
//! - [`crypto`]: AES-256-GCM, HKDF/PBKDF2, SHA-256, base64url, CSPRNG.
//! - [`keychain`]: master key storage backends.
//! - [`secret_box`]: seal/open with optional auxiliary entropy.
//! - [`token_store`]: sealed refresh-token file.
//! - [`envelope`]: vault sealing, protection modes and the local vault file.
//! - [`passkey`]: the passkey secret capability.
//! - [`model`]: wire value types (`VaultBlob`, `KeyEnvelope`, `VaultMeta`).
//! - [`error`]: unified error types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vaultsync_vault::{KeychainSecretBox, ProtectionSecret, VaultEnvelopeManager, platform_keychain};
//!
//! # fn example() -> vaultsync_vault::Result<()> {
//! let data_dir = std::path::Path::new(".vaultsync");
//! let secret_box = Arc::new(KeychainSecretBox::new(platform_keychain(data_dir)));
//! let manager = VaultEnvelopeManager::new(data_dir, "laptop", secret_box);
//!
//! let secret = ProtectionSecret::Bound(b"passkey-prf-output".to_vec());
//! let sealed = manager.encrypt_vault(b"vault plaintext", &secret)?;
//! manager.persist_local(&sealed.ciphertext)?;
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod envelope;
pub mod error;
mod fs_util;
pub mod keychain;
pub mod model;
pub mod passkey;
pub mod secret_box;
pub mod token_store;

pub use envelope::{
    MAX_VAULT_BYTES, MIN_VAULT_BYTES, ProtectionMode, ProtectionSecret, SealedVault,
    VaultEnvelopeManager,
};
pub use error::{Result, VaultError};
pub use fs_util::atomic_write;
pub use keychain::{FileKeychain, KeychainProvider, MemoryKeychain, platform_keychain};
pub use model::{KeyEnvelope, VaultBlob, VaultMeta};
pub use passkey::{
    PasskeySecret, PasskeySecretProvider, StaticSecretProvider, UnavailableSecretProvider,
};
pub use secret_box::{KeychainSecretBox, SecretBox};
pub use token_store::{ConnectionStatus, RefreshTokenStore};
