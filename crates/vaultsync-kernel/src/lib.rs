//! Orchestration kernel for vaultsync.
//!
//! Ties the protection layer ([`vaultsync_vault`]), the OAuth flow
//! ([`vaultsync_auth`]) and the sync client ([`vaultsync_sync`]) together:
//!
//! - **Config**: layered settings (overrides, environment, TOML file, defaults)
//! - **Orchestrator**: the provisioning state machine with a single conflict
//!   retry
//! - **Cursor**: last server-confirmed vault version
//! - **Progress**: human-readable progress sink
//!
//! The capability traits the orchestrator consumes are re-exported here so
//! front ends only need this crate to implement them.

pub mod config;
pub mod cursor;
pub mod error;
pub mod orchestrator;
pub mod progress;

pub use config::{
    AppConfig, ConfigProvider, DefaultsProvider, EnvProvider, FileProvider, LayeredConfig,
    OAuthSettings, OverrideProvider, SyncSettings,
};
pub use cursor::{SyncCursor, SyncCursorStore};
pub use error::{KernelError, Result};
pub use orchestrator::{
    ProvisionReport, RemoteStatus, SyncOutcome, SyncState, UnlockedVault, VaultSyncOrchestrator,
};
pub use progress::{ProgressLevel, ProgressSink, TracingProgressSink};

// Capabilities consumed by the orchestrator.
pub use vaultsync_auth::BrowserLauncher;
pub use vaultsync_vault::{PasskeySecret, PasskeySecretProvider};
