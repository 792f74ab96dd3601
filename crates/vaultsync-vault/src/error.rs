//! Vault error types.
//!
//! All vault subsystems surface errors through [`VaultError`], which is the
//! single error type returned by every public API in this crate. Local vault
//! size violations each get their own variant so callers can tell the user
//! exactly what to do next.

use std::path::PathBuf;

/// Unified error type for the vaultsync protection layer.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Crypto errors ------------------------------------------------------
    /// Encryption failed (e.g. invalid key length, ring internal error).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Decryption failed (e.g. wrong key, corrupted ciphertext, bad nonce).
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// Key derivation failed (HKDF expansion or PBKDF2 parameters).
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    /// The system CSPRNG could not produce random bytes.
    #[error("secure random generation failed")]
    RandomFailed,

    /// A base64url value could not be decoded.
    #[error("invalid encoding: {reason}")]
    InvalidEncoding { reason: String },

    // -- Keychain errors ----------------------------------------------------
    /// The master key could not be retrieved from the keychain.
    #[error("master key not found in keychain")]
    MasterKeyNotFound,

    /// Writing the master key to the keychain failed.
    #[error("failed to store master key: {reason}")]
    MasterKeyStoreFailed { reason: String },

    /// The keychain backend is unavailable or unsupported on this platform.
    #[error("keychain unavailable: {reason}")]
    KeychainUnavailable { reason: String },

    // -- Local vault blob ---------------------------------------------------
    /// No local vault ciphertext has been written yet.
    #[error("vault data is missing: {}", path.display())]
    VaultMissing { path: PathBuf },

    /// The local vault file exists but holds zero bytes.
    #[error("vault data is empty: {}", path.display())]
    VaultEmpty { path: PathBuf },

    /// The local vault file is smaller than any valid ciphertext.
    #[error("vault data is too small ({size} bytes, minimum {min})")]
    VaultTooSmall { size: u64, min: u64 },

    /// The local vault file exceeds the accepted ciphertext size.
    #[error("vault data is too large ({size} bytes, maximum {max})")]
    VaultTooLarge { size: u64, max: u64 },

    // -- Passkey capability -------------------------------------------------
    /// The user cancelled the passkey ceremony.
    #[error("passkey operation cancelled: {reason}")]
    Cancelled { reason: String },

    /// The passkey capability failed for a reason other than cancellation.
    #[error("passkey operation failed: {reason}")]
    PasskeyFailed { reason: String },

    /// A caller supplied an argument the store cannot accept.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // -- Underlying errors --------------------------------------------------
    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant. Prefer a typed variant whenever possible.
    #[error("internal vault error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Whether this error describes a local vault file that cannot be used
    /// (missing, empty, or outside the accepted size range).
    pub fn is_local_vault_problem(&self) -> bool {
        matches!(
            self,
            Self::VaultMissing { .. }
                | Self::VaultEmpty { .. }
                | Self::VaultTooSmall { .. }
                | Self::VaultTooLarge { .. }
        )
    }

    /// A short recovery instruction for errors the user can act on.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::VaultMissing { .. } => {
                Some("set vault unlock to passkey and provision the vault again")
            }
            Self::VaultEmpty { .. } | Self::VaultTooSmall { .. } => {
                Some("vault data looks corrupted; re-create the vault passkey and retry")
            }
            Self::VaultTooLarge { .. } => {
                Some("vault data is unexpected; re-create the vault passkey and retry")
            }
            Self::DecryptionFailed { .. } => {
                Some("the vault was sealed on another device or with a different passkey secret")
            }
            Self::Cancelled { .. } => Some("complete the passkey prompt to continue"),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
