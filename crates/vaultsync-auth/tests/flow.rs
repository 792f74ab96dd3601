//! End-to-end tests for the loopback authorization flow against a scripted
//! token endpoint and a simulated browser.

mod support;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;

use support::{MockResponse, MockServer};
use vaultsync_auth::pkce::challenge_for;
use vaultsync_auth::{AuthError, BrowserLauncher, OAuthConfig, OAuthFlow};
use vaultsync_vault::{KeychainSecretBox, MemoryKeychain, RefreshTokenStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

enum Redirect {
    /// Redirect with a code and the state from the URL.
    Approve,
    /// Redirect with the state altered by one character.
    TamperState,
    /// Redirect with `error=access_denied`.
    Deny,
    /// Never redirect.
    Silent,
}

struct FakeBrowser {
    redirect: Redirect,
    opened: Mutex<Vec<String>>,
}

impl FakeBrowser {
    fn new(redirect: Redirect) -> Self {
        Self {
            redirect,
            opened: Mutex::new(Vec::new()),
        }
    }

    fn opened_params(&self) -> HashMap<String, String> {
        let opened = self.opened.lock().unwrap();
        let url = Url::parse(opened.last().expect("browser was opened")).unwrap();
        url.query_pairs().into_owned().collect()
    }
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn open(&self, url: &str) -> vaultsync_auth::Result<()> {
        self.opened.lock().unwrap().push(url.to_string());

        let parsed = Url::parse(url).unwrap();
        let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        let redirect = Url::parse(&params["redirect_uri"]).unwrap();
        let port = redirect.port().unwrap();
        let mut state = params["state"].clone();

        let query = match self.redirect {
            Redirect::Silent => return Ok(()),
            Redirect::Approve => format!("code=4%2F0Aauth-code&state={state}&scope=email"),
            Redirect::TamperState => {
                let last = state.pop().unwrap();
                state.push(if last == 'A' { 'B' } else { 'A' });
                format!("code=4%2F0Aauth-code&state={state}")
            }
            Redirect::Deny => format!("error=access_denied&state={state}"),
        };
        let target = format!("{}?{query}", redirect.path());

        tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
                .await
                .unwrap();
            let request = format!("GET {target} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\n\r\n");
            stream.write_all(request.as_bytes()).await.unwrap();
            let mut response = Vec::new();
            let _ = stream.read_to_end(&mut response).await;
        });
        Ok(())
    }
}

fn token_store(dir: &std::path::Path) -> RefreshTokenStore {
    let secret_box = Arc::new(KeychainSecretBox::new(Box::new(MemoryKeychain::new())));
    RefreshTokenStore::new(dir, secret_box)
}

fn flow_for(server: &MockServer) -> OAuthFlow {
    let mut config = OAuthConfig::google("test-client.apps.example");
    config.client_secret = Some("test-secret".into());
    config.token_url = format!("{}/token", server.base_url);
    config.loopback_port = 0;
    config.callback_timeout = Duration::from_secs(5);
    OAuthFlow::new(config).unwrap()
}

const TOKENS_WITH_REFRESH: &str = r#"{"access_token":"ya29.access","refresh_token":"1//fresh-refresh","expires_in":3599,"token_type":"Bearer","scope":"openid email"}"#;
const TOKENS_WITHOUT_REFRESH: &str = r#"{"access_token":"ya29.access","expires_in":3599,"token_type":"Bearer","scope":"openid email"}"#;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn authorize_persists_refresh_token() {
    let server = MockServer::start(vec![MockResponse::json(200, TOKENS_WITH_REFRESH)]).await;
    let dir = tempfile::tempdir().unwrap();
    let store = token_store(dir.path());
    let flow = flow_for(&server);
    let browser = FakeBrowser::new(Redirect::Approve);

    let outcome = flow.authorize(&browser, &store).await.unwrap();
    assert!(outcome.refresh_token_rotated);
    assert_eq!(outcome.scope, "openid email");
    assert_eq!(store.load().as_deref(), Some("1//fresh-refresh"));
    assert!(!flow.is_in_progress());

    let url_params = browser.opened_params();
    assert_eq!(url_params["access_type"], "offline");
    assert_eq!(url_params["prompt"], "consent");
    assert!(!url_params.contains_key("code_verifier"));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let exchange = &requests[0];
    assert_eq!(exchange.method, "POST");
    assert_eq!(exchange.path, "/token");
    assert_eq!(exchange.form_value("grant_type").as_deref(), Some("authorization_code"));
    assert_eq!(exchange.form_value("code").as_deref(), Some("4/0Aauth-code"));
    assert_eq!(exchange.form_value("client_secret").as_deref(), Some("test-secret"));
    assert_eq!(
        exchange.form_value("redirect_uri").as_deref(),
        Some(url_params["redirect_uri"].as_str())
    );

    let verifier = exchange.form_value("code_verifier").unwrap();
    assert_eq!(verifier.len(), 86);
    assert_eq!(challenge_for(&verifier), url_params["code_challenge"]);
}

#[tokio::test]
async fn state_mismatch_skips_token_exchange() {
    let server = MockServer::start(vec![MockResponse::json(200, TOKENS_WITH_REFRESH)]).await;
    let dir = tempfile::tempdir().unwrap();
    let store = token_store(dir.path());
    let flow = flow_for(&server);

    let result = flow
        .authorize(&FakeBrowser::new(Redirect::TamperState), &store)
        .await;

    assert!(matches!(result, Err(AuthError::StateMismatch)));
    assert_eq!(server.request_count(), 0);
    assert_eq!(store.load(), None);
}

#[tokio::test]
async fn denied_consent_is_reported() {
    let server = MockServer::start(vec![MockResponse::json(200, TOKENS_WITH_REFRESH)]).await;
    let dir = tempfile::tempdir().unwrap();
    let flow = flow_for(&server);

    let result = flow
        .authorize(&FakeBrowser::new(Redirect::Deny), &token_store(dir.path()))
        .await;

    match result {
        Err(AuthError::AuthorizationDenied { error, .. }) => assert_eq!(error, "access_denied"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(server.request_count(), 0);
}

#[tokio::test]
async fn missing_refresh_token_keeps_stored_one() {
    let server = MockServer::start(vec![MockResponse::json(200, TOKENS_WITHOUT_REFRESH)]).await;
    let dir = tempfile::tempdir().unwrap();
    let store = token_store(dir.path());
    store.save("1//existing").unwrap();
    let flow = flow_for(&server);

    let outcome = flow
        .authorize(&FakeBrowser::new(Redirect::Approve), &store)
        .await
        .unwrap();

    assert!(!outcome.refresh_token_rotated);
    assert_eq!(store.load().as_deref(), Some("1//existing"));
}

#[tokio::test]
async fn missing_refresh_token_without_stored_one_fails() {
    let server = MockServer::start(vec![MockResponse::json(200, TOKENS_WITHOUT_REFRESH)]).await;
    let dir = tempfile::tempdir().unwrap();
    let store = token_store(dir.path());
    let flow = flow_for(&server);

    let result = flow
        .authorize(&FakeBrowser::new(Redirect::Approve), &store)
        .await;

    assert!(matches!(result, Err(AuthError::NoRefreshToken)));
    assert_eq!(store.load(), None);
    assert_eq!(flow.last_diagnostics().unwrap().error, "no_refresh_token");
}

#[tokio::test]
async fn token_error_is_captured_in_diagnostics() {
    let body = r#"{"error":"invalid_grant","error_description":"Bad Request"}"#;
    let server = MockServer::start(vec![MockResponse::json(400, body)]).await;
    let dir = tempfile::tempdir().unwrap();
    let flow = flow_for(&server);

    let result = flow
        .authorize(&FakeBrowser::new(Redirect::Approve), &token_store(dir.path()))
        .await;

    match result {
        Err(AuthError::TokenExchangeFailed { error, status, .. }) => {
            assert_eq!(error, "invalid_grant");
            assert_eq!(status, 400);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let diagnostics = flow.last_diagnostics().unwrap();
    assert_eq!(diagnostics.error_description.as_deref(), Some("Bad Request"));
    assert_eq!(diagnostics.raw_body.as_deref(), Some(body));
}

#[tokio::test]
async fn concurrent_authorize_is_rejected() {
    let server = MockServer::start(vec![]).await;
    let dir = tempfile::tempdir().unwrap();
    let store = token_store(dir.path());

    let mut config = OAuthConfig::google("test-client");
    config.token_url = format!("{}/token", server.base_url);
    config.loopback_port = 0;
    config.callback_timeout = Duration::from_millis(300);
    let flow = OAuthFlow::new(config).unwrap();

    let silent = FakeBrowser::new(Redirect::Silent);
    let (first, second) = tokio::join!(flow.authorize(&silent, &store), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        flow.authorize(&silent, &store).await
    });

    assert!(matches!(first, Err(AuthError::Cancelled { .. })));
    assert!(matches!(second, Err(AuthError::AuthorizationInProgress)));
    assert!(!flow.is_in_progress());
}

#[tokio::test]
async fn refresh_uses_stored_token_and_stores_rotation() {
    let rotated = r#"{"access_token":"ya29.new","refresh_token":"1//rotated","expires_in":3599}"#;
    let server = MockServer::start(vec![MockResponse::json(200, rotated)]).await;
    let dir = tempfile::tempdir().unwrap();
    let store = token_store(dir.path());
    store.save("1//original").unwrap();
    let flow = flow_for(&server);

    let tokens = flow.refresh(&store).await.unwrap();
    assert_eq!(tokens.access_token, "ya29.new");
    assert_eq!(store.load().as_deref(), Some("1//rotated"));

    let request = &server.requests()[0];
    assert_eq!(request.form_value("grant_type").as_deref(), Some("refresh_token"));
    assert_eq!(request.form_value("refresh_token").as_deref(), Some("1//original"));
}

#[tokio::test]
async fn refresh_without_stored_token_fails() {
    let server = MockServer::start(vec![]).await;
    let dir = tempfile::tempdir().unwrap();
    let flow = flow_for(&server);

    let result = flow.refresh(&token_store(dir.path())).await;
    assert!(matches!(result, Err(AuthError::NoRefreshToken)));
    assert_eq!(server.request_count(), 0);
}
