//! OAuth 2.0 Authorization Code requests (RFC 6749) with PKCE (RFC 7636).
//!
//! [`AuthorizationUrlBuilder`] produces the URL the browser visits and
//! [`TokenExchangeClient`] talks to the token endpoint, for both the
//! authorization-code and refresh-token grants. Neither keeps per-attempt
//! state; the PKCE values are passed in explicitly.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::callback::DEFAULT_LOOPBACK_PORT;
use crate::error::{AuthError, Result};
use crate::pkce::PkceSession;

/// Google's authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google's token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Default scopes requested when none are configured.
pub const DEFAULT_SCOPES: &[&str] = &["openid", "email"];

/// How long to wait for the browser redirect by default.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for a single token endpoint round trip.
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings for the loopback authorization flow.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Only sent when set (installed-app clients may have one).
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    /// Loopback port; `0` picks an ephemeral one.
    pub loopback_port: u16,
    pub callback_timeout: Duration,
}

impl OAuthConfig {
    /// Google endpoints with the default scopes and port.
    pub fn google(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            loopback_port: DEFAULT_LOOPBACK_PORT,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }

    /// Reject configurations that cannot start a flow.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::InvalidConfig {
                reason: "client_id is empty".into(),
            });
        }
        Url::parse(&self.auth_url)?;
        Url::parse(&self.token_url)?;
        Ok(())
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .field("loopback_port", &self.loopback_port)
            .field("callback_timeout", &self.callback_timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Authorization URL
// ---------------------------------------------------------------------------

/// Builds the authorization request URL.
pub struct AuthorizationUrlBuilder<'a> {
    config: &'a OAuthConfig,
}

impl<'a> AuthorizationUrlBuilder<'a> {
    pub fn new(config: &'a OAuthConfig) -> Self {
        Self { config }
    }

    /// Authorization URL for `session`, redirecting to `redirect_uri`.
    ///
    /// Values are percent-encoded with the RFC 3986 unreserved set, so a
    /// space becomes `%20`. Only the challenge is sent here, never the
    /// verifier.
    pub fn build(&self, redirect_uri: &str, session: &PkceSession) -> Result<String> {
        let base = Url::parse(&self.config.auth_url)?;
        let separator = if base.query().is_some() { '&' } else { '?' };
        let scope = self.config.scopes.join(" ");

        let params = [
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", session.state.as_str()),
            ("code_challenge", session.code_challenge.as_str()),
            ("code_challenge_method", "S256"),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ];

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!("{}{separator}{query}", base.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Token response
// ---------------------------------------------------------------------------

/// JSON body returned by the token endpoint.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: String,
    #[serde(rename = "expires_in")]
    pub expires_in_seconds: i64,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// The refresh token, treating an empty string as absent.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_in_seconds", &self.expires_in_seconds)
            .field("error", &self.error)
            .field("error_description", &self.error_description)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Token exchange
// ---------------------------------------------------------------------------

/// HTTP client for the token endpoint.
pub struct TokenExchangeClient {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
}

impl TokenExchangeClient {
    pub fn new(config: &OAuthConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone().filter(|s| !s.is_empty()),
        })
    }

    /// Exchange an authorization code for tokens.
    ///
    /// `redirect_uri` must be the exact URI used in the authorization
    /// request, and `code_verifier` the verifier behind its challenge.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse> {
        let mut params = vec![
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        tracing::debug!(token_url = %self.token_url, "exchanging authorization code");
        self.post_form(&params).await
    }

    /// Obtain a fresh access token with a stored refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let mut params = vec![
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("grant_type", "refresh_token"),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        tracing::debug!(token_url = %self.token_url, "refreshing access token");
        self.post_form(&params).await
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .client
            .post(&self.token_url)
            .form(params)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_token_response(status, &body)
    }
}

/// Interpret a token endpoint reply.
///
/// An `error` field wins regardless of status. A non-2xx status without one,
/// or a body that is not a token response, is still a failure.
pub fn parse_token_response(status: u16, body: &str) -> Result<TokenResponse> {
    let parsed: TokenResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            return Err(AuthError::TokenExchangeFailed {
                error: "invalid_response".into(),
                description: Some(e.to_string()),
                status,
                raw_body: body.to_string(),
            });
        }
    };

    if let Some(error) = parsed.error.clone().filter(|e| !e.is_empty()) {
        tracing::warn!(status, error = %error, "token endpoint returned an error");
        return Err(AuthError::TokenExchangeFailed {
            error,
            description: parsed.error_description.clone(),
            status,
            raw_body: body.to_string(),
        });
    }

    if !(200..300).contains(&status) {
        return Err(AuthError::TokenExchangeFailed {
            error: format!("http_{status}"),
            description: None,
            status,
            raw_body: body.to_string(),
        });
    }

    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
