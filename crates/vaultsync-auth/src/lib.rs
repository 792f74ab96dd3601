//! OAuth 2.0 loopback authorization for vaultsync.
//!
//! This crate obtains a long-lived refresh token from a delegated identity
//! provider (Google by default) using the Authorization Code flow with PKCE
//! and a loopback redirect:
//!
//! - **PKCE session**: per-attempt `state`, verifier and S256 challenge
//! - **Loopback listener**: single-shot HTTP listener on `127.0.0.1`
//! - **Token exchange**: authorization-code and refresh-token grants
//! - **Flow**: the end-to-end attempt, persisting the refresh token in the
//!   device-sealed [`vaultsync_vault::RefreshTokenStore`]
//!
//! # Architecture
//!
//! ```text
//! OAuthFlow
//! ├── PkceSession             (state + verifier + challenge)
//! ├── LoopbackListener        (GET /oauth2/callback)
//! ├── AuthorizationUrlBuilder (browser URL)
//! ├── TokenExchangeClient     (POST token endpoint)
//! └── RefreshTokenStore       (sealed refresh token)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vaultsync_auth::{BrowserLauncher, OAuthConfig, OAuthFlow};
//! use vaultsync_vault::{KeychainSecretBox, RefreshTokenStore, platform_keychain};
//!
//! # async fn example(browser: &dyn BrowserLauncher) -> vaultsync_auth::Result<()> {
//! let data_dir = std::path::Path::new(".vaultsync");
//! let secret_box = Arc::new(KeychainSecretBox::new(platform_keychain(data_dir)));
//! let store = RefreshTokenStore::new(data_dir, secret_box);
//!
//! let flow = OAuthFlow::new(OAuthConfig::google("1234.apps.googleusercontent.com"))?;
//! let outcome = flow.authorize(browser, &store).await?;
//! println!("granted scope: {}", outcome.scope);
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod error;
pub mod flow;
pub mod oauth;
pub mod pkce;

pub use callback::{CallbackParams, DEFAULT_LOOPBACK_PORT, LoopbackListener};
pub use error::{AuthError, Result};
pub use flow::{AuthorizationOutcome, BrowserLauncher, OAuthDiagnostics, OAuthFlow};
pub use oauth::{AuthorizationUrlBuilder, OAuthConfig, TokenExchangeClient, TokenResponse};
pub use pkce::PkceSession;
