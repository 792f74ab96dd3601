//! Error types for the auth crate.
//!
//! All authorization operations surface errors through [`AuthError`]. Each
//! variant carries enough context for callers to decide whether to retry,
//! ask the user to act, or give up.

use vaultsync_vault::VaultError;

/// Unified error type for the vaultsync OAuth flow.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The attempt was abandoned (callback timeout, closed browser, user
    /// cancellation).
    #[error("authorization cancelled: {reason}")]
    Cancelled { reason: String },

    /// Another authorization attempt is already running.
    #[error("an authorization attempt is already in progress")]
    AuthorizationInProgress,

    /// The authorization server redirected back with an `error` parameter.
    #[error("authorization denied: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    /// The callback `state` does not match the one sent with the request.
    #[error("callback state does not match the authorization request")]
    StateMismatch,

    /// The callback carried no authorization code.
    #[error("callback did not include an authorization code")]
    MissingAuthorizationCode,

    /// The token endpoint rejected the exchange or returned garbage.
    #[error("token exchange failed (HTTP {status}): {error}")]
    TokenExchangeFailed {
        error: String,
        description: Option<String>,
        status: u16,
        raw_body: String,
    },

    /// The provider issued no refresh token and none is stored.
    #[error("no refresh token was issued and none is stored")]
    NoRefreshToken,

    /// The loopback listener received a request it cannot use.
    #[error("invalid callback request: {reason}")]
    InvalidCallback { reason: String },

    /// OAuth settings are missing or malformed.
    #[error("invalid OAuth configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The system browser could not be opened.
    #[error("failed to open browser: {reason}")]
    Browser { reason: String },

    /// An HTTP request to the token endpoint failed in transport.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Sealing or storing the refresh token failed.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    /// I/O error from the loopback listener.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error.
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl AuthError {
    /// A short recovery instruction for errors the user can act on.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NoRefreshToken => Some(
                "remove this app's access from your account's third-party access settings, then sign in again",
            ),
            Self::StateMismatch => {
                Some("close any stale sign-in tabs and start the sign-in again")
            }
            Self::AuthorizationDenied { .. } => {
                Some("sign-in was declined in the browser; approve the requested access to continue")
            }
            Self::Cancelled { .. } => Some("complete the sign-in in the browser before it times out"),
            Self::AuthorizationInProgress => Some("wait for the running sign-in to finish"),
            Self::TokenExchangeFailed { .. } => {
                Some("check the OAuth client id and secret, then sign in again")
            }
            Self::InvalidConfig { .. } => Some("set oauth.client_id (or VAULTSYNC_OAUTH_CLIENT_ID)"),
            _ => None,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_token_exchange_failed() {
        let err = AuthError::TokenExchangeFailed {
            error: "invalid_grant".to_string(),
            description: Some("Bad Request".to_string()),
            status: 400,
            raw_body: "{}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "token exchange failed (HTTP 400): invalid_grant"
        );
    }

    #[test]
    fn error_display_cancelled() {
        let err = AuthError::Cancelled {
            reason: "no callback within 5s".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "authorization cancelled: no callback within 5s"
        );
    }

    #[test]
    fn hints_for_recoverable_errors() {
        assert!(AuthError::NoRefreshToken.hint().is_some());
        assert!(AuthError::StateMismatch.hint().is_some());
        assert!(
            AuthError::InvalidCallback {
                reason: "x".into()
            }
            .hint()
            .is_none()
        );
    }

    #[test]
    fn vault_errors_convert() {
        let err: AuthError = VaultError::RandomFailed.into();
        assert!(matches!(err, AuthError::Vault(_)));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthError>();
    }
}
