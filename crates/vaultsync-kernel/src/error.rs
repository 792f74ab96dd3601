//! Kernel error types.
//!
//! [`KernelError`] wraps the errors of the lower crates and adds the
//! configuration failures that only the kernel can detect.

use vaultsync_auth::AuthError;
use vaultsync_sync::SyncError;
use vaultsync_vault::VaultError;

/// Unified error type for vaultsync orchestration.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Configuration ------------------------------------------------------
    /// A setting is present but cannot be interpreted.
    #[error("invalid setting `{key}`: {reason}")]
    InvalidSetting { key: String, reason: String },

    /// A setting required by the requested operation is not set.
    #[error("missing required setting `{key}`")]
    MissingSetting { key: String },

    /// The operation needs a remote sync endpoint and none is configured.
    #[error("no sync endpoint configured")]
    SyncNotConfigured,

    // -- Lower layers -------------------------------------------------------
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// I/O error outside the vault files (settings, sync cursor).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal kernel error: {0}")]
    Internal(String),
}

impl KernelError {
    /// A short recovery instruction for errors the user can act on.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Vault(e) => e.hint(),
            Self::Auth(e) => e.hint(),
            Self::Sync(e) => e.hint(),
            Self::MissingSetting { .. } | Self::InvalidSetting { .. } => Some(
                "set it in the settings file, a VAULTSYNC_* environment variable, or with --set key=value",
            ),
            Self::SyncNotConfigured => Some("set sync.base_url (or VAULTSYNC_SYNC_BASE_URL)"),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
