//! The provisioning and sync state machine.
//!
//! ```text
//! Idle ─┬─> Authorizing ─┐
//!       └────────────────┴─> Encrypting ─> Persisting ─┬─> Syncing ─┬─> Synced
//!                                                      │            └─> SyncFailed
//!                                                      └─> SyncSkipped
//! ```
//!
//! The local write always happens before any remote call and is never rolled
//! back; remote failures end in [`SyncState::SyncFailed`] with the server's
//! diagnostics attached to the report.

use std::path::Path;
use std::sync::{Arc, Mutex};

use vaultsync_auth::{BrowserLauncher, OAuthFlow};
use vaultsync_sync::{
    PutVaultRequest, PutVaultResponse, SyncClient, SyncError, SyncHttpStatus, VaultRecord,
};
use vaultsync_vault::envelope::fingerprint;
use vaultsync_vault::{
    PasskeySecretProvider, ProtectionMode, ProtectionSecret, RefreshTokenStore, SealedVault,
    SecretBox, VaultEnvelopeManager,
};

use crate::config::{AppConfig, SyncSettings};
use crate::cursor::{SyncCursor, SyncCursorStore};
use crate::error::{KernelError, Result};
use crate::progress::{ProgressLevel, ProgressSink, TracingProgressSink};

// ---------------------------------------------------------------------------
// States and reports
// ---------------------------------------------------------------------------

/// Where the orchestrator is in a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Authorizing,
    Encrypting,
    Persisting,
    Syncing,
    Synced,
    SyncSkipped,
    SyncFailed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Authorizing => "authorizing",
            Self::Encrypting => "encrypting",
            Self::Persisting => "persisting",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::SyncSkipped => "sync-skipped",
            Self::SyncFailed => "sync-failed",
        }
    }

    /// Whether a run has finished in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Synced | Self::SyncSkipped | Self::SyncFailed)
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the remote half of a run ended.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Synced {
        vault_version: i64,
        updated_at: String,
        /// Whether a version conflict forced a second write.
        retried: bool,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: SyncError,
    },
}

impl SyncOutcome {
    /// A warning to show the user, if the remote half did not succeed.
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Failed { error } => Some(error.diagnostic()),
            _ => None,
        }
    }
}

/// Summary of a completed provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub state: SyncState,
    pub mode: ProtectionMode,
    pub authorized: bool,
    pub vault_fingerprint: String,
    pub ciphertext_len: usize,
    pub sync: SyncOutcome,
}

/// A decrypted local vault.
pub struct UnlockedVault {
    pub plaintext: Vec<u8>,
    pub mode: ProtectionMode,
    pub fingerprint: String,
}

impl std::fmt::Debug for UnlockedVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedVault")
            .field("plaintext", &format_args!("<{} bytes>", self.plaintext.len()))
            .field("mode", &self.mode)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// The remote record compared against local state.
#[derive(Debug, Clone)]
pub struct RemoteStatus {
    pub record: VaultRecord,
    /// Fingerprint of the local ciphertext, if there is a usable one.
    pub local_fingerprint: Option<String>,
    /// Version recorded by the sync cursor before this fetch.
    pub cursor_version: i64,
}

impl RemoteStatus {
    /// `None` when there is no local vault to compare with.
    pub fn matches_local(&self) -> Option<bool> {
        self.local_fingerprint
            .as_deref()
            .map(|local| local == self.record.meta.blob_sha256_b64)
    }

    pub fn remote_mode(&self) -> Option<ProtectionMode> {
        ProtectionMode::from_kek_scheme(&self.record.key_envelope.kek_scheme)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives authorization, sealing, local persistence and remote sync.
pub struct VaultSyncOrchestrator {
    sync_settings: SyncSettings,
    token_store: RefreshTokenStore,
    envelope: VaultEnvelopeManager,
    cursor: SyncCursorStore,
    oauth: Option<OAuthFlow>,
    sync: Option<SyncClient>,
    passkey: Arc<dyn PasskeySecretProvider>,
    browser: Arc<dyn BrowserLauncher>,
    progress: Arc<dyn ProgressSink>,
    state: Mutex<SyncState>,
}

impl VaultSyncOrchestrator {
    /// Wire the orchestrator from resolved settings.
    ///
    /// Authorization is only available when `oauth.client_id` is set; remote
    /// sync only when `sync.base_url` is set.
    pub fn new(
        config: &AppConfig,
        secret_box: Arc<dyn SecretBox>,
        passkey: Arc<dyn PasskeySecretProvider>,
        browser: Arc<dyn BrowserLauncher>,
    ) -> Result<Self> {
        let data_dir = config.data_dir.as_path();

        let oauth = match config.oauth.client_id {
            Some(_) => Some(OAuthFlow::new(config.oauth_config()?)?),
            None => None,
        };
        let sync = config
            .sync
            .base_url
            .as_deref()
            .map(|base| -> Result<SyncClient> {
                let client = SyncClient::new(base)?
                    .with_bearer_token(config.sync.bearer_token.clone().unwrap_or_default())
                    .with_timeout(config.sync.timeout);
                Ok(client)
            })
            .transpose()?;

        Ok(Self {
            sync_settings: config.sync.clone(),
            token_store: RefreshTokenStore::new(data_dir, Arc::clone(&secret_box)),
            envelope: VaultEnvelopeManager::new(data_dir, config.sync.device_id.clone(), secret_box),
            cursor: SyncCursorStore::new(data_dir),
            oauth,
            sync,
            passkey,
            browser,
            progress: Arc::new(TracingProgressSink),
            state: Mutex::new(SyncState::Idle),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn token_store(&self) -> &RefreshTokenStore {
        &self.token_store
    }

    pub fn envelope(&self) -> &VaultEnvelopeManager {
        &self.envelope
    }

    pub fn cursor(&self) -> &SyncCursorStore {
        &self.cursor
    }

    pub fn oauth_flow(&self) -> Option<&OAuthFlow> {
        self.oauth.as_ref()
    }

    pub fn sync_client(&self) -> Option<&SyncClient> {
        self.sync.as_ref()
    }

    pub fn vault_path(&self) -> &Path {
        self.envelope.vault_path()
    }

    /// Current state-machine state.
    pub fn state(&self) -> SyncState {
        self.state.lock().map_or(SyncState::Idle, |s| *s)
    }

    fn enter(&self, next: SyncState, level: ProgressLevel, message: &str) {
        let previous = match self.state.lock() {
            Ok(mut state) => std::mem::replace(&mut *state, next),
            Err(_) => SyncState::Idle,
        };
        tracing::info!(from = %previous, to = %next, "sync state transition");
        self.progress.notify(level, message);
    }

    fn oauth(&self) -> Result<&OAuthFlow> {
        self.oauth.as_ref().ok_or_else(|| KernelError::MissingSetting {
            key: crate::config::keys::OAUTH_CLIENT_ID.into(),
        })
    }

    /// Run the OAuth flow on its own and persist the refresh token.
    pub async fn authorize(&self) -> Result<vaultsync_auth::AuthorizationOutcome> {
        let flow = self.oauth()?;
        self.enter(
            SyncState::Authorizing,
            ProgressLevel::Info,
            "opening the browser for sign-in",
        );
        let result = flow.authorize(self.browser.as_ref(), &self.token_store).await;
        self.enter(SyncState::Idle, ProgressLevel::Info, "sign-in finished");
        Ok(result?)
    }

    /// Provision `plaintext` end to end: authorize if needed, seal, persist
    /// locally, then sync when a remote endpoint is configured.
    ///
    /// Errors before the local write are returned as `Err`; once the vault is
    /// saved, remote problems are reported in [`ProvisionReport::sync`].
    pub async fn run(&self, plaintext: &[u8]) -> Result<ProvisionReport> {
        self.enter(SyncState::Idle, ProgressLevel::Info, "starting vault provisioning");
        match self.run_inner(plaintext).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.enter(
                    SyncState::Idle,
                    ProgressLevel::Error,
                    &format!("vault provisioning failed: {e}"),
                );
                Err(e)
            }
        }
    }

    async fn run_inner(&self, plaintext: &[u8]) -> Result<ProvisionReport> {
        let authorized = if self.token_store.load().is_none() {
            let flow = self.oauth()?;
            self.enter(
                SyncState::Authorizing,
                ProgressLevel::Info,
                "no stored credential, opening the browser for sign-in",
            );
            flow.authorize(self.browser.as_ref(), &self.token_store)
                .await?;
            true
        } else {
            false
        };

        self.enter(SyncState::Encrypting, ProgressLevel::Info, "encrypting vault");
        let secret = self.envelope.obtain_secret(self.passkey.as_ref()).await?;
        if let ProtectionSecret::Unbound { reason } = &secret {
            self.progress.notify(
                ProgressLevel::Warn,
                &format!("passkey secret unavailable ({reason}); sealing with the device key only"),
            );
        }
        let sealed = self.envelope.encrypt_vault(plaintext, &secret)?;

        self.enter(SyncState::Persisting, ProgressLevel::Info, "saving vault locally");
        self.envelope.persist_local(&sealed.ciphertext)?;

        let sync = match &self.sync {
            None => {
                let reason = "no sync endpoint configured".to_string();
                self.enter(
                    SyncState::SyncSkipped,
                    ProgressLevel::Info,
                    "vault saved locally; remote sync skipped",
                );
                SyncOutcome::Skipped { reason }
            }
            Some(client) => {
                self.enter(
                    SyncState::Syncing,
                    ProgressLevel::Info,
                    &format!("syncing vault to {}", client.base_url()),
                );
                self.push(client, &sealed).await
            }
        };

        Ok(ProvisionReport {
            state: self.state(),
            mode: sealed.mode,
            authorized,
            vault_fingerprint: sealed.fingerprint().to_string(),
            ciphertext_len: sealed.ciphertext.len(),
            sync,
        })
    }

    /// Upload with at most one conflict retry.
    async fn push(&self, client: &SyncClient, sealed: &SealedVault) -> SyncOutcome {
        let user_id = self.sync_settings.user_id.as_str();
        let expected = self.cursor.expected_version(user_id);
        let Some(new_version) = expected.checked_add(1) else {
            return self.sync_failed(version_overflow(0, expected));
        };
        let request = PutVaultRequest {
            expected_version: expected,
            new_version,
            device_id: self.sync_settings.device_id.clone(),
            vault_blob: sealed.blob.clone(),
            key_envelope: sealed.envelope.clone(),
            meta: sealed.meta.clone(),
        };

        let result = match client.put_vault(user_id, &request).await {
            Err(SyncError::VersionConflict { status }) => match status.server_version {
                Some(server_version) => match server_version.checked_add(1) {
                    Some(next) => {
                        tracing::info!(
                            expected,
                            server_version,
                            "version conflict, retrying against the server version"
                        );
                        self.progress.notify(
                            ProgressLevel::Info,
                            &format!("server is at version {server_version}, retrying once"),
                        );
                        let retry = request.with_versions(server_version, next);
                        client.put_vault(user_id, &retry).await.map(|r| (r, true))
                    }
                    None => Err(version_overflow(status.status_code, server_version)),
                },
                None => Err(SyncError::VersionConflict { status }),
            },
            other => other.map(|r| (r, false)),
        };

        match result {
            Ok((response, retried)) => self.record_synced(response, retried),
            Err(error) => self.sync_failed(error),
        }
    }

    fn sync_failed(&self, error: SyncError) -> SyncOutcome {
        tracing::warn!(error = %error, "remote sync failed, local vault kept");
        self.enter(
            SyncState::SyncFailed,
            ProgressLevel::Warn,
            &error.diagnostic(),
        );
        SyncOutcome::Failed { error }
    }

    fn record_synced(&self, response: PutVaultResponse, retried: bool) -> SyncOutcome {
        let cursor = SyncCursor {
            user_id: self.sync_settings.user_id.clone(),
            vault_version: response.vault_version,
            updated_at: response.updated_at.clone(),
        };
        if let Err(e) = self.cursor.save(&cursor) {
            tracing::warn!(error = %e, "failed to save sync cursor");
        }

        self.enter(
            SyncState::Synced,
            ProgressLevel::Info,
            &format!("vault synced at version {}", response.vault_version),
        );
        SyncOutcome::Synced {
            vault_version: response.vault_version,
            updated_at: response.updated_at,
            retried,
        }
    }

    /// Fetch the remote record and compare it with the local ciphertext.
    ///
    /// When both agree the sync cursor adopts the remote version.
    pub async fn fetch_remote(&self) -> Result<RemoteStatus> {
        let client = self.sync.as_ref().ok_or(KernelError::SyncNotConfigured)?;
        let user_id = self.sync_settings.user_id.as_str();
        let cursor_version = self.cursor.expected_version(user_id);

        let record = client.get_vault(user_id).await?;

        let local_fingerprint = match self.envelope.read_local() {
            Ok(ciphertext) => Some(fingerprint(&ciphertext)),
            Err(e) if e.is_local_vault_problem() => {
                tracing::debug!(error = %e, "no usable local vault to compare");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let status = RemoteStatus {
            record,
            local_fingerprint,
            cursor_version,
        };
        match status.matches_local() {
            Some(true) if status.record.vault_version != cursor_version => {
                let cursor = SyncCursor {
                    user_id: user_id.to_string(),
                    vault_version: status.record.vault_version,
                    updated_at: status.record.meta.updated_at.clone(),
                };
                self.cursor.save(&cursor)?;
            }
            Some(false) => self.progress.notify(
                ProgressLevel::Warn,
                &format!(
                    "remote vault (version {}) differs from the local copy",
                    status.record.vault_version
                ),
            ),
            _ => {}
        }
        Ok(status)
    }

    /// Decrypt the local vault with the current protection secret.
    pub async fn unlock(&self) -> Result<UnlockedVault> {
        let ciphertext = self.envelope.read_local()?;
        let secret = self.envelope.obtain_secret(self.passkey.as_ref()).await?;
        let plaintext = self.envelope.decrypt_vault(&ciphertext, &secret)?;
        self.progress.notify(ProgressLevel::Info, "vault unlocked");
        Ok(UnlockedVault {
            plaintext,
            mode: secret.mode(),
            fingerprint: fingerprint(&ciphertext),
        })
    }

    /// Forget the stored refresh credential. Returns whether one existed.
    pub fn disconnect(&self) -> Result<bool> {
        let removed = self.token_store.delete()?;
        self.enter(
            SyncState::Idle,
            ProgressLevel::Info,
            if removed {
                "stored credential removed"
            } else {
                "no stored credential to remove"
            },
        );
        Ok(removed)
    }
}

/// A version with no successor; `status_code` is `0` for a local cursor.
fn version_overflow(status_code: u16, version: i64) -> SyncError {
    SyncError::Remote {
        status: SyncHttpStatus {
            status_code,
            server_version: (status_code != 0).then_some(version),
            error_code: Some("INVALID_RESPONSE".into()),
            error_message: Some(format!("vault version {version} cannot be incremented")),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
