//! Wire types for the self-hosted vault sync protocol.
//!
//! Field names match the server's JSON. Records decode leniently: missing or
//! empty descriptor fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use vaultsync_vault::model::{DEFAULT_ALG, DEFAULT_KDF_INFO, KEK_SCHEME_SECRET_BOUND};
use vaultsync_vault::{KeyEnvelope, VaultBlob, VaultMeta};

/// A vault revision as stored by the sync server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultRecord {
    pub user_id: String,
    pub vault_version: i64,
    pub device_clock: String,
    pub vault_blob: VaultBlob,
    pub key_envelope: KeyEnvelope,
    pub meta: VaultMeta,
}

impl VaultRecord {
    /// Replace empty descriptor strings with their protocol defaults.
    pub(crate) fn normalize(mut self) -> Self {
        if self.vault_blob.alg.is_empty() {
            self.vault_blob.alg = DEFAULT_ALG.to_string();
        }
        if self.key_envelope.kek_scheme.is_empty() {
            self.key_envelope.kek_scheme = KEK_SCHEME_SECRET_BOUND.to_string();
        }
        if self.key_envelope.kdf_info.is_empty() {
            self.key_envelope.kdf_info = DEFAULT_KDF_INFO.to_string();
        }
        self
    }
}

/// Body of `PUT /v1/vaults/{user_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutVaultRequest {
    pub expected_version: i64,
    pub new_version: i64,
    pub device_id: String,
    pub vault_blob: VaultBlob,
    pub key_envelope: KeyEnvelope,
    pub meta: VaultMeta,
}

impl PutVaultRequest {
    /// The same payload targeting a different version pair.
    pub fn with_versions(&self, expected_version: i64, new_version: i64) -> Self {
        Self {
            expected_version,
            new_version,
            ..self.clone()
        }
    }
}

/// Server acknowledgement of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutVaultResponse {
    pub ok: bool,
    pub vault_version: i64,
    pub updated_at: String,
}

/// Raw acknowledgement; `vault_version` may be omitted by the server. A
/// missing `ok` counts as a rejected write.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawPutVaultResponse {
    pub ok: Option<bool>,
    pub vault_version: Option<i64>,
    pub updated_at: String,
}

impl RawPutVaultResponse {
    pub(crate) fn into_response(self, request: &PutVaultRequest) -> PutVaultResponse {
        PutVaultResponse {
            ok: self.ok.unwrap_or(false),
            vault_version: self.vault_version.unwrap_or(request.new_version),
            updated_at: self.updated_at,
        }
    }
}

/// Error body returned by the server on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
    pub server_version: Option<i64>,
}

/// HTTP-level details of a sync round trip.
///
/// `status_code` is `0` when the request never produced a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncHttpStatus {
    pub status_code: u16,
    pub server_version: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl SyncHttpStatus {
    /// Build from a non-2xx response, keeping non-JSON bodies verbatim.
    pub(crate) fn from_error_body(status_code: u16, body: &str) -> Self {
        let mut status = Self {
            status_code,
            ..Self::default()
        };
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => {
                status.error_code = parsed.code.filter(|c| !c.is_empty());
                status.error_message = parsed.message.filter(|m| !m.is_empty());
                status.server_version = parsed.server_version;
            }
            Err(_) if !body.trim().is_empty() => {
                status.error_message = Some(body.to_string());
            }
            Err(_) => {}
        }
        status
    }

    pub(crate) fn client_error(message: impl Into<String>) -> Self {
        Self {
            status_code: 0,
            error_code: Some("CLIENT_ERROR".into()),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

impl std::fmt::Display for SyncHttpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status={}", self.status_code)?;
        if let Some(code) = &self.error_code {
            write!(f, " code={code}")?;
        }
        if let Some(message) = &self.error_message {
            write!(f, " message={message}")?;
        }
        if let Some(version) = self.server_version {
            write!(f, " server_version={version}")?;
        }
        Ok(())
    }
}
