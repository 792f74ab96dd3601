//! Loopback listener for the OAuth redirect.
//!
//! After consent the authorization server redirects the browser to
//! `http://127.0.0.1:{port}/oauth2/callback?code=...&state=...`. The
//! [`LoopbackListener`] binds that port before the browser is opened, accepts
//! exactly one request, answers it with a short page and releases the socket.
//!
//! Raw [`tokio::net::TcpListener`] is all this needs; there is no HTTP server
//! framework involved.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{AuthError, Result};

/// Path the redirect must target.
pub const CALLBACK_PATH: &str = "/oauth2/callback";

/// Port used when none is configured.
pub const DEFAULT_LOOPBACK_PORT: u16 = 53682;

/// Largest request head the listener will buffer.
const MAX_REQUEST_BYTES: usize = 8192;

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>vaultsync</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: #f5f5f5;
            color: #333;
        }
        .card {
            text-align: center;
            padding: 3rem;
            background: white;
            border-radius: 12px;
            box-shadow: 0 2px 10px rgba(0,0,0,0.08);
        }
    </style>
</head>
<body>
    <div class="card">
        <h1>Sign-in received</h1>
        <p>You can close this tab and return to vaultsync.</p>
    </div>
</body>
</html>"#;

/// Query parameters carried by the redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// `http://127.0.0.1:{port}/oauth2/callback`.
pub fn redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{port}{CALLBACK_PATH}")
}

/// Single-shot HTTP listener on the loopback interface.
pub struct LoopbackListener {
    listener: TcpListener,
    port: u16,
}

impl LoopbackListener {
    /// Bind `127.0.0.1:{port}`. Port `0` picks an ephemeral port; use
    /// [`local_port`](Self::local_port) to learn which.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, "loopback listener waiting for OAuth redirect");
        Ok(Self { listener, port })
    }

    /// The port actually bound.
    pub fn local_port(&self) -> u16 {
        self.port
    }

    /// The redirect URI pointing at this listener.
    pub fn redirect_uri(&self) -> String {
        redirect_uri(self.port)
    }

    /// Wait for one redirect, answer it and close the socket.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Cancelled`] if nothing arrives within `timeout`.
    /// - [`AuthError::InvalidCallback`] for a malformed request or a path
    ///   other than [`CALLBACK_PATH`] (answered with 400/404).
    pub async fn accept_one(self, timeout: Duration) -> Result<CallbackParams> {
        let outcome = tokio::time::timeout(timeout, self.accept_inner()).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "no OAuth redirect arrived");
                Err(AuthError::Cancelled {
                    reason: format!(
                        "no authorization callback within {} seconds",
                        timeout.as_secs()
                    ),
                })
            }
        }
    }

    async fn accept_inner(&self) -> Result<CallbackParams> {
        let (mut stream, peer) = self.listener.accept().await?;
        tracing::debug!(peer = %peer, "accepted callback connection");

        let head = read_request_head(&mut stream).await?;

        let target = match parse_request_line(&head) {
            Ok(target) => target,
            Err(e) => {
                respond(&mut stream, "400 Bad Request", "text/plain", "Bad Request").await?;
                return Err(e);
            }
        };

        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        if path != CALLBACK_PATH {
            respond(&mut stream, "404 Not Found", "text/plain", "Not Found").await?;
            return Err(AuthError::InvalidCallback {
                reason: format!("unexpected callback path {path}"),
            });
        }

        let params = parse_callback_query(query);
        respond(&mut stream, "200 OK", "text/html; charset=utf-8", SUCCESS_HTML).await?;

        tracing::info!(
            has_code = !params.code.is_empty(),
            has_error = params.error.is_some(),
            "OAuth redirect received"
        );
        Ok(params)
    }
}

/// Read until the end of the request line (or the whole head fits).
async fn read_request_head(stream: &mut TcpStream) -> Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(2).any(|w| w == b"\r\n") || buf.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }

    if buf.is_empty() {
        return Err(AuthError::InvalidCallback {
            reason: "connection closed without a request".into(),
        });
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn respond(stream: &mut TcpStream, status: &str, content_type: &str, body: &str) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// Extract the request target from `GET <target> HTTP/1.1`.
fn parse_request_line(request: &str) -> Result<&str> {
    let line = request.lines().next().unwrap_or_default();
    let mut parts = line.split_whitespace();

    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(target),
        (Some(method), Some(_)) => Err(AuthError::InvalidCallback {
            reason: format!("unsupported method {method}"),
        }),
        _ => Err(AuthError::InvalidCallback {
            reason: format!("malformed request line: {line}"),
        }),
    }
}

/// Pull `code`, `state`, `error` and `error_description` from a query string.
/// Unknown keys are ignored; for repeated keys the first one wins.
pub fn parse_callback_query(query: &str) -> CallbackParams {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let slot = match key {
            "code" => &mut code,
            "state" => &mut state,
            "error" => &mut error,
            "error_description" => &mut error_description,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(percent_decode(value));
        }
    }

    CallbackParams {
        code: code.unwrap_or_default(),
        state: state.unwrap_or_default(),
        error: error.filter(|e| !e.is_empty()),
        error_description: error_description.filter(|d| !d.is_empty()),
    }
}

/// Lenient percent-decoding for query values.
///
/// `%XX` becomes the byte it names and `+` becomes a space. Sequences that
/// are not valid hex (or are truncated) stay literal. Decoded bytes that are
/// not UTF-8 are replaced rather than rejected.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_standard() {
        let params = parse_callback_query("code=abc123&state=xyz789&scope=email");
        assert_eq!(params.code, "abc123");
        assert_eq!(params.state, "xyz789");
        assert_eq!(params.error, None);
    }

    #[test]
    fn parse_query_error() {
        let params = parse_callback_query("error=access_denied&state=s");
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.state, "s");
        assert!(params.code.is_empty());
    }

    #[test]
    fn parse_query_missing_values() {
        let params = parse_callback_query("state&code=");
        assert!(params.code.is_empty());
        assert!(params.state.is_empty());

        let params = parse_callback_query("");
        assert_eq!(params, CallbackParams::default());
    }

    #[test]
    fn percent_decode_basic() {
        assert_eq!(percent_decode("hello"), "hello");
        assert_eq!(percent_decode("hello%20world"), "hello world");
        assert_eq!(percent_decode("4%2F0Ab"), "4/0Ab");
        assert_eq!(percent_decode("a+b"), "a b");
        assert_eq!(percent_decode("%E3%81%82"), "あ");
    }

    #[test]
    fn percent_decode_is_lenient() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("%4"), "%4");
        assert_eq!(percent_decode("%%41"), "%A");
    }

    #[test]
    fn request_line_parsing() {
        assert_eq!(
            parse_request_line("GET /oauth2/callback?code=1 HTTP/1.1\r\n").unwrap(),
            "/oauth2/callback?code=1"
        );
        assert!(parse_request_line("POST /oauth2/callback HTTP/1.1\r\n").is_err());
        assert!(parse_request_line("").is_err());
        assert!(parse_request_line("GARBAGE").is_err());
    }

    #[test]
    fn redirect_uri_format() {
        assert_eq!(
            redirect_uri(53682),
            "http://127.0.0.1:53682/oauth2/callback"
        );
    }

    async fn send_request(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("GET {target} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn listener_receives_callback() {
        let listener = LoopbackListener::bind(0).await.unwrap();
        let port = listener.local_port();
        assert_ne!(port, 0);

        let client = tokio::spawn(async move {
            send_request(port, "/oauth2/callback?code=4%2F0Ab&state=st_1").await
        });

        let params = listener.accept_one(Duration::from_secs(5)).await.unwrap();
        let response = client.await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("You can close this tab"));
        assert_eq!(params.code, "4/0Ab");
        assert_eq!(params.state, "st_1");
    }

    #[tokio::test]
    async fn wrong_path_gets_404() {
        let listener = LoopbackListener::bind(0).await.unwrap();
        let port = listener.local_port();

        let client = tokio::spawn(async move { send_request(port, "/favicon.ico").await });

        let result = listener.accept_one(Duration::from_secs(5)).await;
        let response = client.await.unwrap();

        assert!(response.starts_with("HTTP/1.1 404 Not Found"));
        assert!(matches!(result, Err(AuthError::InvalidCallback { .. })));
    }

    #[tokio::test]
    async fn timeout_cancels_and_releases_port() {
        let listener = LoopbackListener::bind(0).await.unwrap();
        let port = listener.local_port();

        let result = listener.accept_one(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(AuthError::Cancelled { .. })));

        // The socket is released, so the port can be bound again.
        let again = LoopbackListener::bind(port).await.unwrap();
        assert_eq!(again.local_port(), port);
    }

    #[test]
    fn listener_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LoopbackListener>();
    }
}
