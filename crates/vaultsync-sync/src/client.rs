//! HTTP client for the self-hosted vault sync API.
//!
//! [`SyncClient`] is stateless per call: it holds only the parsed base URL,
//! an optional bearer token and a pooled `reqwest` client, so one instance
//! can serve any number of user ids concurrently.

use std::time::Duration;

use url::Url;

use crate::error::{Result, SyncError};
use crate::types::{
    PutVaultRequest, PutVaultResponse, RawPutVaultResponse, SyncHttpStatus, VaultRecord,
};

/// Default per-request timeout.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_millis(15_000);

const USER_AGENT: &str = concat!("vaultsync/", env!("CARGO_PKG_VERSION"));
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Client for `GET`/`PUT {base}/v1/vaults/{user_id}`.
#[derive(Clone)]
pub struct SyncClient {
    client: reqwest::Client,
    base: Url,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("base", &self.base.as_str())
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SyncClient {
    /// Create a client for `base_url` with the default timeout.
    ///
    /// The URL is parsed once; query, fragment and trailing slashes are
    /// dropped so the base path composes cleanly with `/v1/vaults/...`.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidBaseUrl`] for a malformed URL and
    /// [`SyncError::Network`] when the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let invalid = |reason: String| SyncError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };

        let mut base = Url::parse(base_url.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
        }
        if base.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".into()));
        }
        let path = base.path().trim_end_matches('/').to_string();
        base.set_path(&path);
        base.set_query(None);
        base.set_fragment(None);

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SyncError::Network {
                status: SyncHttpStatus::client_error(format!("cannot build http client: {e}")),
            })?;

        Ok(Self {
            client,
            base,
            bearer_token: None,
            timeout: DEFAULT_SYNC_TIMEOUT,
        })
    }

    /// Send `Authorization: Bearer {token}` with every request. An empty
    /// token sends no header.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.bearer_token = (!token.trim().is_empty()).then_some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The vault resource URL for `user_id`, which is encoded as a single
    /// path segment.
    pub fn vault_url(&self, user_id: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::InvalidBaseUrl {
                url: self.base.to_string(),
                reason: "base url cannot carry a path".into(),
            })?
            .pop_if_empty()
            .extend(["v1", "vaults", user_id]);
        Ok(url)
    }

    /// Fetch the current vault record.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] when the user has no vault yet, otherwise the
    /// usual status mapping; an undecodable 2xx body is a
    /// [`SyncError::Remote`] with code `INVALID_RESPONSE`.
    pub async fn get_vault(&self, user_id: &str) -> Result<VaultRecord> {
        let url = self.vault_url(user_id)?;
        tracing::debug!(url = %url, "fetching remote vault");

        let request = self.authorize(self.client.get(url));
        let (status, body) = self.send(request).await?;
        check_status(status, &body)?;

        let record: VaultRecord =
            serde_json::from_str(&body).map_err(|e| invalid_response(status, &e))?;
        let record = record.normalize();
        tracing::debug!(vault_version = record.vault_version, "remote vault fetched");
        Ok(record)
    }

    /// Write a new vault revision with optimistic concurrency.
    ///
    /// # Errors
    ///
    /// [`SyncError::VersionConflict`] when `expected_version` is stale; its
    /// status carries the server's current version when reported.
    /// A 2xx reply without `ok: true` is a [`SyncError::Remote`] with code
    /// `NOT_OK`, so a returned response is always acknowledged.
    pub async fn put_vault(
        &self,
        user_id: &str,
        request: &PutVaultRequest,
    ) -> Result<PutVaultResponse> {
        let url = self.vault_url(user_id)?;
        let payload = serde_json::to_vec(request).map_err(|e| SyncError::Network {
            status: SyncHttpStatus::client_error(e.to_string()),
        })?;
        tracing::debug!(
            url = %url,
            expected_version = request.expected_version,
            new_version = request.new_version,
            "uploading vault"
        );

        let builder = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(payload);
        let (status, body) = self.send(self.authorize(builder)).await?;
        check_status(status, &body)?;

        let raw: RawPutVaultResponse =
            serde_json::from_str(&body).map_err(|e| invalid_response(status, &e))?;
        let response = raw.into_response(request);
        if !response.ok {
            tracing::warn!(status_code = status, "sync server did not acknowledge the write");
            return Err(SyncError::Remote {
                status: SyncHttpStatus {
                    status_code: status,
                    server_version: None,
                    error_code: Some("NOT_OK".into()),
                    error_message: Some("server did not acknowledge the write".into()),
                },
            });
        }
        tracing::info!(vault_version = response.vault_version, "vault uploaded");
        Ok(response)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<(u16, String)> {
        let response = builder
            .timeout(self.timeout)
            .send()
            .await
            .map_err(network_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(network_error)?;
        Ok((status, body))
    }
}

fn network_error(err: reqwest::Error) -> SyncError {
    let reason = if err.is_timeout() {
        format!("request timed out: {err}")
    } else {
        err.to_string()
    };
    tracing::warn!(error = %reason, "sync request failed in transport");
    SyncError::Network {
        status: SyncHttpStatus::client_error(reason),
    }
}

fn invalid_response(status_code: u16, err: &serde_json::Error) -> SyncError {
    tracing::warn!(status_code, error = %err, "undecodable sync response body");
    SyncError::Remote {
        status: SyncHttpStatus {
            status_code,
            server_version: None,
            error_code: Some("INVALID_RESPONSE".into()),
            error_message: Some(err.to_string()),
        },
    }
}

/// Map a response status onto the sync error taxonomy.
fn check_status(status_code: u16, body: &str) -> Result<()> {
    if (200..300).contains(&status_code) {
        return Ok(());
    }

    let status = SyncHttpStatus::from_error_body(status_code, body);
    tracing::warn!(%status, "sync server rejected the request");
    Err(match status_code {
        404 => SyncError::NotFound { status },
        409 => SyncError::VersionConflict { status },
        401 | 403 => SyncError::AccessDenied { status },
        _ => SyncError::Remote { status },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
