//! Transient loopback HTTP listener for the OAuth redirect.
//!
//! Bound on `127.0.0.1` for the duration of a single flow. The listener
//! accepts plain HTTP GETs, answers the browser with a small HTML page, and
//! resolves the flow with the authorization code or a terminal error. The
//! socket is released exactly once, on whichever terminal outcome happens
//! first (code, denial, state mismatch, timeout, or drop on cancellation).

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::error::{AuthError, Result};

/// Upper bound on the request head we're willing to buffer.
const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// A callback request is tiny and local; connections that haven't produced
/// a full head within this window (browser speculative preconnects) are
/// dropped so they cannot block the real callback.
const HEAD_READ_TIMEOUT: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "<!DOCTYPE html>\
<html><head><title>Sign-in complete</title></head>\
<body style=\"font-family: sans-serif; text-align: center; padding-top: 4em;\">\
<h1>Sign-in complete</h1>\
<p>You can close this window and return to the application.</p>\
</body></html>";

const DENIED_PAGE: &str = "<!DOCTYPE html>\
<html><head><title>Sign-in failed</title></head>\
<body style=\"font-family: sans-serif; text-align: center; padding-top: 4em;\">\
<h1>Sign-in failed</h1>\
<p>Authorization was not granted. You can close this window.</p>\
</body></html>";

/// A callback listener bound for one authorization flow.
pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
}

impl CallbackListener {
    /// Bind `127.0.0.1:<preferred_port>`, falling back to an ephemeral port
    /// when the preferred one is taken. Passing 0 always binds ephemeral.
    pub async fn bind(preferred_port: u16) -> Result<Self> {
        let listener = match TcpListener::bind(("127.0.0.1", preferred_port)).await {
            Ok(listener) => listener,
            Err(err) if preferred_port != 0 => {
                debug!(
                    preferred_port,
                    error = %err,
                    "preferred callback port unavailable, binding ephemeral"
                );
                TcpListener::bind(("127.0.0.1", 0)).await?
            }
            Err(err) => return Err(err.into()),
        };

        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    /// The actually bound port; the authorize URL is built from this.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the provider redirect and resolve the flow.
    ///
    /// Consumes the listener: the socket is dropped on return. Requests to
    /// other paths get 404 and do not affect the flow; a well-pathed
    /// request with neither `code` nor `error` gets 400 and the wait
    /// continues. A state nonce mismatch fails closed immediately.
    pub async fn wait_for_code(
        self,
        path: &str,
        nonce: &str,
        wait: Duration,
    ) -> Result<String> {
        match tokio::time::timeout(wait, self.accept_loop(path, nonce)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("timed out waiting for authorization callback");
                Err(AuthError::AuthTimeout)
            }
        }
    }

    async fn accept_loop(&self, path: &str, nonce: &str) -> Result<String> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            debug!(%peer, "callback connection accepted");

            let target = match tokio::time::timeout(
                HEAD_READ_TIMEOUT,
                read_request_target(&mut stream),
            )
            .await
            {
                Ok(Some(target)) => target,
                Ok(None) => {
                    respond(&mut stream, 400, "text/plain", "Bad Request").await;
                    continue;
                }
                Err(_) => {
                    debug!("dropping silent callback connection");
                    continue;
                }
            };

            let (req_path, query) = match target.split_once('?') {
                Some((p, q)) => (p, q),
                None => (target.as_str(), ""),
            };

            if req_path != path {
                respond(&mut stream, 404, "text/plain", "Not Found").await;
                continue;
            }

            let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect();

            if let Some(error) = params.get("error") {
                respond(&mut stream, 200, "text/html; charset=utf-8", DENIED_PAGE).await;
                return Err(AuthError::ProviderDenied {
                    error: error.clone(),
                    description: params.get("error_description").cloned(),
                });
            }

            let Some(code) = params.get("code") else {
                respond(&mut stream, 400, "text/plain", "Bad Request").await;
                continue;
            };

            // Fail closed on any state discrepancy; the code is discarded.
            if params.get("state").map(String::as_str) != Some(nonce) {
                warn!("authorization callback state mismatch");
                respond(&mut stream, 200, "text/html; charset=utf-8", DENIED_PAGE).await;
                return Err(AuthError::StateMismatch);
            }

            respond(&mut stream, 200, "text/html; charset=utf-8", SUCCESS_PAGE).await;
            return Ok(code.clone());
        }
    }
}

/// Read the request head and extract the request target from the request
/// line (`GET <target> HTTP/1.1`). Returns `None` on anything malformed.
async fn read_request_target(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() > MAX_REQUEST_BYTES {
            break;
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let request_line = head.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    if method != "GET" {
        return None;
    }
    Some(target.to_string())
}

async fn respond(stream: &mut TcpStream, status: u16, content_type: &str, body: &str) {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        content_type,
        body.len(),
        body
    );
    if let Err(err) = stream.write_all(response.as_bytes()).await {
        debug!(error = %err, "failed to write callback response");
    }
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn send_request(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n", target);
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn test_successful_callback_yields_code() {
        let listener = CallbackListener::bind(0).await.unwrap();
        let port = listener.port();

        let wait = tokio::spawn(async move {
            listener
                .wait_for_code("/callback", "nonce-1", Duration::from_secs(5))
                .await
        });

        let response = send_request(port, "/callback?code=abc123&state=nonce-1").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("close this window"));

        let code = wait.await.unwrap().unwrap();
        assert_eq!(code, "abc123");
    }

    #[tokio::test]
    async fn test_denied_callback_and_port_release() {
        let listener = CallbackListener::bind(0).await.unwrap();
        let port = listener.port();

        let wait = tokio::spawn(async move {
            listener
                .wait_for_code("/callback", "nonce-1", Duration::from_secs(5))
                .await
        });

        let response =
            send_request(port, "/callback?error=access_denied&error_description=denied").await;
        assert!(response.contains("Sign-in failed"));

        let result = wait.await.unwrap();
        match result {
            Err(AuthError::ProviderDenied { error, description }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(description.as_deref(), Some("denied"));
            }
            other => panic!("expected ProviderDenied, got {:?}", other),
        }

        // The port must be usable again for the next flow.
        let rebound = CallbackListener::bind(port).await.unwrap();
        assert_eq!(rebound.port(), port);
    }

    #[tokio::test]
    async fn test_state_mismatch_fails_closed() {
        let listener = CallbackListener::bind(0).await.unwrap();
        let port = listener.port();

        let wait = tokio::spawn(async move {
            listener
                .wait_for_code("/callback", "expected-nonce", Duration::from_secs(5))
                .await
        });

        send_request(port, "/callback?code=abc&state=wrong-nonce").await;

        let result = wait.await.unwrap();
        assert!(matches!(result, Err(AuthError::StateMismatch)));

        // Listener was torn down: a new connection must fail.
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_path_and_malformed_request_do_not_consume_flow() {
        let listener = CallbackListener::bind(0).await.unwrap();
        let port = listener.port();

        let wait = tokio::spawn(async move {
            listener
                .wait_for_code("/callback", "nonce-1", Duration::from_secs(5))
                .await
        });

        let response = send_request(port, "/favicon.ico").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        // Well-pathed but with neither code nor error
        let response = send_request(port, "/callback?foo=bar").await;
        assert!(response.starts_with("HTTP/1.1 400"));

        // Flow still completes afterwards
        send_request(port, "/callback?code=late&state=nonce-1").await;
        let code = wait.await.unwrap().unwrap();
        assert_eq!(code, "late");
    }

    #[tokio::test]
    async fn test_silent_connection_does_not_block_flow() {
        let listener = CallbackListener::bind(0).await.unwrap();
        let port = listener.port();

        let wait = tokio::spawn(async move {
            listener
                .wait_for_code("/callback", "nonce-1", Duration::from_secs(10))
                .await
        });

        // Speculative preconnect that never sends a byte
        let _idle = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The real callback still resolves once the idle connection is shed
        send_request(port, "/callback?code=abc&state=nonce-1").await;
        let code = wait.await.unwrap().unwrap();
        assert_eq!(code, "abc");
    }

    #[tokio::test]
    async fn test_timeout_rejects_with_auth_timeout() {
        let listener = CallbackListener::bind(0).await.unwrap();
        let result = listener
            .wait_for_code("/callback", "nonce-1", Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(AuthError::AuthTimeout)));
    }

    #[tokio::test]
    async fn test_bind_falls_back_to_ephemeral_port() {
        let first = CallbackListener::bind(0).await.unwrap();
        let taken = first.port();

        let second = CallbackListener::bind(taken).await.unwrap();
        assert_ne!(second.port(), taken);
    }

    #[tokio::test]
    async fn test_bind_prefers_requested_port_when_free() {
        // Grab a free port, release it, then ask for it explicitly.
        let probe = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let listener = CallbackListener::bind(port).await.unwrap();
        assert_eq!(listener.port(), port);
    }
}
