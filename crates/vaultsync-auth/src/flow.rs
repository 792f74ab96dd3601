//! End-to-end loopback authorization.
//!
//! [`OAuthFlow::authorize`] ties the pieces together: generate a PKCE
//! session, bind the loopback listener, open the browser, validate the
//! redirect, exchange the code and persist the refresh token. Only one
//! attempt may run at a time.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use vaultsync_vault::RefreshTokenStore;

use crate::callback::LoopbackListener;
use crate::error::{AuthError, Result};
use crate::oauth::{AuthorizationUrlBuilder, OAuthConfig, TokenExchangeClient, TokenResponse};
use crate::pkce::PkceSession;

/// Opens a URL in the user's browser.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open(&self, url: &str) -> Result<()>;
}

/// Summary of the last token endpoint failure, kept for troubleshooting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthDiagnostics {
    pub error: String,
    pub error_description: Option<String>,
    pub status: Option<u16>,
    pub raw_body: Option<String>,
    pub recorded_at: String,
}

impl std::fmt::Display for OAuthDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} error='{}' description='{}'",
            self.recorded_at,
            self.error,
            self.error_description.as_deref().unwrap_or_default()
        )?;
        if let Some(status) = self.status {
            write!(f, " status={status}")?;
        }
        if let Some(raw) = &self.raw_body {
            write!(f, " | {raw}")?;
        }
        Ok(())
    }
}

/// Result of a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationOutcome {
    /// `true` when the provider issued a new refresh token and it was saved;
    /// `false` when the previously stored one was kept.
    pub refresh_token_rotated: bool,
    pub scope: String,
    pub expires_in_seconds: i64,
}

/// Clears the in-progress flag when the attempt ends, however it ends.
struct InProgressGuard<'a>(&'a AtomicBool);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The loopback Authorization Code + PKCE flow.
pub struct OAuthFlow {
    config: OAuthConfig,
    exchange: TokenExchangeClient,
    in_progress: AtomicBool,
    diagnostics: Mutex<Option<OAuthDiagnostics>>,
}

impl OAuthFlow {
    pub fn new(config: OAuthConfig) -> Result<Self> {
        config.validate()?;
        let exchange = TokenExchangeClient::new(&config)?;
        Ok(Self {
            config,
            exchange,
            in_progress: AtomicBool::new(false),
            diagnostics: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Whether an authorization attempt is currently running.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// The last recorded token endpoint failure, if any.
    pub fn last_diagnostics(&self) -> Option<OAuthDiagnostics> {
        self.diagnostics.lock().ok().and_then(|d| d.clone())
    }

    fn set_diagnostics(&self, value: Option<OAuthDiagnostics>) {
        if let Ok(mut slot) = self.diagnostics.lock() {
            *slot = value;
        }
    }

    fn record_failure(&self, err: &AuthError) {
        let diagnostics = match err {
            AuthError::TokenExchangeFailed {
                error,
                description,
                status,
                raw_body,
            } => OAuthDiagnostics {
                error: error.clone(),
                error_description: description.clone(),
                status: Some(*status),
                raw_body: Some(raw_body.clone()),
                recorded_at: vaultsync_vault::model::now_timestamp(),
            },
            AuthError::NoRefreshToken => OAuthDiagnostics {
                error: "no_refresh_token".into(),
                error_description: Some(
                    "token response did not include refresh_token and none is stored".into(),
                ),
                status: None,
                raw_body: None,
                recorded_at: vaultsync_vault::model::now_timestamp(),
            },
            _ => return,
        };
        self.set_diagnostics(Some(diagnostics));
    }

    /// Run one full authorization attempt and persist the refresh token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AuthorizationInProgress`] if another attempt is running.
    /// - [`AuthError::AuthorizationDenied`], [`AuthError::StateMismatch`] or
    ///   [`AuthError::MissingAuthorizationCode`] for a bad redirect; no token
    ///   exchange happens in these cases.
    /// - [`AuthError::Cancelled`] if the redirect does not arrive in time.
    /// - [`AuthError::TokenExchangeFailed`] or [`AuthError::NoRefreshToken`]
    ///   from the exchange.
    pub async fn authorize(
        &self,
        browser: &dyn BrowserLauncher,
        token_store: &RefreshTokenStore,
    ) -> Result<AuthorizationOutcome> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("authorization already in progress");
            return Err(AuthError::AuthorizationInProgress);
        }
        let _guard = InProgressGuard(&self.in_progress);
        self.set_diagnostics(None);

        let result = self.run_attempt(browser, token_store).await;
        if let Err(ref e) = result {
            self.record_failure(e);
        }
        result
    }

    async fn run_attempt(
        &self,
        browser: &dyn BrowserLauncher,
        token_store: &RefreshTokenStore,
    ) -> Result<AuthorizationOutcome> {
        let session = PkceSession::generate()?;

        // Listen before the browser opens so the redirect cannot race us.
        let listener = LoopbackListener::bind(self.config.loopback_port).await?;
        let redirect_uri = listener.redirect_uri();
        let url = AuthorizationUrlBuilder::new(&self.config).build(&redirect_uri, &session)?;

        browser.open(&url).await?;
        tracing::info!(port = listener.local_port(), "waiting for browser sign-in");

        let callback = listener.accept_one(self.config.callback_timeout).await?;

        if let Some(error) = callback.error {
            tracing::warn!(error = %error, "authorization server denied the request");
            return Err(AuthError::AuthorizationDenied {
                error,
                description: callback.error_description,
            });
        }
        if callback.state != session.state {
            tracing::warn!("callback state mismatch, discarding authorization code");
            return Err(AuthError::StateMismatch);
        }
        if callback.code.is_empty() {
            return Err(AuthError::MissingAuthorizationCode);
        }

        let tokens = self
            .exchange
            .exchange_code(&callback.code, &redirect_uri, &session.code_verifier)
            .await?;

        let rotated = match tokens.refresh_token() {
            Some(refresh_token) => {
                token_store.save(refresh_token)?;
                true
            }
            // Providers may omit the refresh token on repeat consent.
            None if token_store.load().is_some() => {
                tracing::info!("no refresh token issued, keeping the stored one");
                false
            }
            None => return Err(AuthError::NoRefreshToken),
        };

        tracing::info!(rotated, scope = %tokens.scope, "authorization completed");
        Ok(AuthorizationOutcome {
            refresh_token_rotated: rotated,
            scope: tokens.scope,
            expires_in_seconds: tokens.expires_in_seconds,
        })
    }

    /// Exchange the stored refresh token for a fresh access token.
    ///
    /// A rotated refresh token in the response replaces the stored one.
    pub async fn refresh(&self, token_store: &RefreshTokenStore) -> Result<TokenResponse> {
        let Some(refresh_token) = token_store.load() else {
            return Err(AuthError::NoRefreshToken);
        };

        let result = self.exchange.refresh(&refresh_token).await;
        let tokens = match result {
            Ok(tokens) => tokens,
            Err(e) => {
                self.record_failure(&e);
                return Err(e);
            }
        };

        if let Some(rotated) = tokens.refresh_token()
            && rotated != refresh_token
        {
            token_store.save(rotated)?;
            tracing::info!("stored rotated refresh token");
        }

        self.set_diagnostics(None);
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_invalid_config() {
        let config = OAuthConfig::google("");
        assert!(matches!(
            OAuthFlow::new(config),
            Err(AuthError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn guard_releases_flag() {
        let flag = AtomicBool::new(true);
        {
            let _guard = InProgressGuard(&flag);
        }
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn diagnostics_display() {
        let diagnostics = OAuthDiagnostics {
            error: "invalid_grant".into(),
            error_description: Some("Bad Request".into()),
            status: Some(400),
            raw_body: Some("{}".into()),
            recorded_at: "2026-01-01T00:00:00Z".into(),
        };
        assert_eq!(
            diagnostics.to_string(),
            "2026-01-01T00:00:00Z error='invalid_grant' description='Bad Request' status=400 | {}"
        );
    }

    #[test]
    fn flow_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OAuthFlow>();
    }
}
