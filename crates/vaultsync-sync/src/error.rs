//! Error types for the sync client.
//!
//! Every failure of a sync round trip is a [`SyncError`] carrying the
//! [`SyncHttpStatus`] observed, so callers can report the server's code and
//! message even after the local write has already succeeded.

use crate::types::SyncHttpStatus;

/// Unified error type for the vault sync client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// No vault stored for this user (HTTP 404).
    #[error("vault not found ({status})")]
    NotFound { status: SyncHttpStatus },

    /// The server holds a different version than `expected_version` (HTTP 409).
    #[error("version conflict ({status})")]
    VersionConflict { status: SyncHttpStatus },

    /// The bearer token was missing or rejected (HTTP 401/403).
    #[error("access denied ({status})")]
    AccessDenied { status: SyncHttpStatus },

    /// Any other non-2xx status, or a success body that could not be decoded.
    #[error("remote error ({status})")]
    Remote { status: SyncHttpStatus },

    /// The request never produced a response (connect, TLS, timeout).
    #[error("network error ({status})")]
    Network { status: SyncHttpStatus },

    /// The configured base URL cannot address the sync API.
    #[error("invalid sync base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl SyncError {
    /// HTTP details of the failed round trip, if one was attempted.
    pub fn status(&self) -> Option<&SyncHttpStatus> {
        match self {
            Self::NotFound { status }
            | Self::VersionConflict { status }
            | Self::AccessDenied { status }
            | Self::Remote { status }
            | Self::Network { status } => Some(status),
            Self::InvalidBaseUrl { .. } => None,
        }
    }

    /// The server's current version, when it reported one.
    pub fn server_version(&self) -> Option<i64> {
        self.status().and_then(|s| s.server_version)
    }

    /// A human-readable report of the failure for warnings and status output.
    pub fn diagnostic(&self) -> String {
        let Some(status) = self.status() else {
            return self.to_string();
        };

        let mut out = match status.status_code {
            401 => "unauthorized (401). Check Authorization header format and token setting."
                .to_string(),
            403 => "forbidden (403). Verify bearer token matches server token.".to_string(),
            409 => {
                let mut text =
                    "version conflict (409). Try sync again after refreshing latest state."
                        .to_string();
                if let Some(version) = status.server_version {
                    text.push_str(&format!(" server_version={version}."));
                }
                text
            }
            429 => "rate limited (429). Wait about 1 minute, then retry.".to_string(),
            code => format!("Self-hosted sync failed (local save is kept). status={code}."),
        };
        if let Some(code) = &status.error_code {
            out.push_str(&format!(" code={code}"));
        }
        if let Some(message) = &status.error_message {
            out.push_str(&format!(" message={message}"));
        }
        out
    }

    /// A short recovery instruction for errors the user can act on.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::AccessDenied { .. } => {
                Some("check sync.bearer_token (or VAULTSYNC_SYNC_BEARER_TOKEN)")
            }
            Self::VersionConflict { .. } => Some("run the sync again to pick up the latest version"),
            Self::Network { .. } => Some("check sync.base_url and that the sync server is reachable"),
            Self::InvalidBaseUrl { .. } => Some("set sync.base_url to an http(s) URL"),
            Self::NotFound { .. } => Some("provision the vault from a device that has it"),
            Self::Remote { .. } => None,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SyncError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
