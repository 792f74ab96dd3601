//! Vault envelope value types shared with the sync server.
//!
//! Field names match the server's JSON. Decoding is lenient: any missing
//! field takes its default so older or partial records still load.

use serde::{Deserialize, Serialize};

/// Default content cipher name.
pub const DEFAULT_ALG: &str = "AES-256-GCM";

/// Key-protection scheme for vaults sealed with a passkey-derived secret.
pub const KEK_SCHEME_SECRET_BOUND: &str = "passkey+recovery_code_v1";

/// Key-protection scheme for vaults sealed with the device key alone.
pub const KEK_SCHEME_FALLBACK_UNBOUND: &str = "device+consent_fallback_v1";

/// Default KDF info label.
pub const DEFAULT_KDF_INFO: &str = "vault-dek-wrap";

/// Timestamp format used in vault metadata (ISO-8601, UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Encrypted vault payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultBlob {
    pub ciphertext_b64: String,
    pub nonce_b64: String,
    pub aad_b64: String,
    pub alg: String,
}

impl Default for VaultBlob {
    fn default() -> Self {
        Self {
            ciphertext_b64: String::new(),
            nonce_b64: String::new(),
            aad_b64: String::new(),
            alg: DEFAULT_ALG.to_string(),
        }
    }
}

/// Describes how the vault key is protected, without exposing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyEnvelope {
    pub kek_scheme: String,
    pub wrapped_dek_b64: String,
    pub wrap_nonce_b64: String,
    pub kdf_salt_b64: String,
    pub kdf_info: String,
}

impl Default for KeyEnvelope {
    fn default() -> Self {
        Self {
            kek_scheme: KEK_SCHEME_SECRET_BOUND.to_string(),
            wrapped_dek_b64: String::new(),
            wrap_nonce_b64: String::new(),
            kdf_salt_b64: String::new(),
            kdf_info: DEFAULT_KDF_INFO.to_string(),
        }
    }
}

/// Bookkeeping for a vault revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultMeta {
    pub created_at: String,
    pub updated_at: String,
    pub last_writer_device_id: String,
    pub blob_sha256_b64: String,
}

impl VaultMeta {
    /// Metadata for a revision written now by `device_id`.
    pub fn new_now(device_id: &str, blob_sha256_b64: String) -> Self {
        let now = now_timestamp();
        Self {
            created_at: now.clone(),
            updated_at: now,
            last_writer_device_id: device_id.to_string(),
            blob_sha256_b64,
        }
    }
}

/// Current UTC time in [`TIMESTAMP_FORMAT`].
pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}
