use std::time::Duration;

use bytes::Bytes;

use crate::config::{BackendConfig, ServerConfig};
use crate::error::RelayError;

use super::prepared_backend::PreparedBackend;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_BODY_MAX_CHARS: usize = 500;

/// How backend connections are made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    Direct,
    Socks5 { proxy_url: String },
}

fn build_reqwest_client(proxy_url: Option<&str>) -> Result<reqwest::Client, RelayError> {
    let mut builder = reqwest::Client::builder()
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy();

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| RelayError::Transport(format!("Invalid proxy URL: {err}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|err| RelayError::Transport(format!("Failed to build HTTP client: {err}")))
}

fn build_direct_client() -> reqwest::Client {
    match build_reqwest_client(None) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
            reqwest::Client::new()
        }
    }
}

/// HTTP client for the Sider backend, direct or through a SOCKS5 proxy.
///
/// Built once at startup and shared by all requests.
pub struct HttpTransport {
    client: reqwest::Client,
    mode: TransportMode,
    request_timeout: Duration,
    /// Bound on waiting for response headers when streaming.
    stream_idle_timeout: Duration,
}

impl HttpTransport {
    /// Build the transport. A proxy that cannot be configured is logged and
    /// replaced by a direct connection.
    #[must_use]
    pub fn new(server: &ServerConfig, backend: &BackendConfig) -> Self {
        let request_timeout = Duration::from_secs(server.timeout);
        let stream_idle_timeout = Duration::from_secs(server.stream_idle_timeout);
        let Some(proxy_url) = backend.socks_proxy_url() else {
            return Self {
                client: build_direct_client(),
                mode: TransportMode::Direct,
                request_timeout,
                stream_idle_timeout,
            };
        };

        match build_reqwest_client(Some(&proxy_url)) {
            Ok(client) => {
                tracing::info!(proxy_url = %proxy_url, "using SOCKS5 transport");
                Self {
                    client,
                    mode: TransportMode::Socks5 { proxy_url },
                    request_timeout,
                    stream_idle_timeout,
                }
            }
            Err(err) => {
                tracing::error!(
                    proxy_url = %proxy_url,
                    error = %err,
                    "failed to configure SOCKS5 proxy, falling back to direct connection"
                );
                Self {
                    client: build_direct_client(),
                    mode: TransportMode::Direct,
                    request_timeout,
                    stream_idle_timeout,
                }
            }
        }
    }

    #[must_use]
    pub fn mode(&self) -> &TransportMode {
        &self.mode
    }

    /// POST `body` to the backend and return the response once a 2xx status
    /// has arrived. The body is left unread for the caller to stream.
    ///
    /// Non-streaming requests carry the configured total timeout. Streaming
    /// requests wait at most the idle timeout for response headers; after
    /// that the decoder's idle timeout bounds each read.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when no backend credential is configured,
    /// [`RelayError::Transport`] when the request cannot be sent, and
    /// [`RelayError::Upstream`] for a non-2xx backend status.
    pub async fn send(
        &self,
        backend: &PreparedBackend,
        body: Bytes,
        stream: bool,
    ) -> Result<reqwest::Response, RelayError> {
        if !backend.has_credential() {
            return Err(RelayError::Config(
                "Authorization token not configured".to_string(),
            ));
        }

        let mut request = self
            .client
            .post(backend.url().clone())
            .headers(backend.static_headers().clone())
            .body(body);
        if !stream {
            request = request.timeout(self.request_timeout);
        }

        let sent = if stream {
            match tokio::time::timeout(self.stream_idle_timeout, request.send()).await {
                Ok(sent) => sent,
                Err(_) => {
                    return Err(RelayError::Transport(format!(
                        "backend sent no response headers within {}s",
                        self.stream_idle_timeout.as_secs()
                    )))
                }
            }
        } else {
            request.send().await
        };
        let response = sent.map_err(|err| {
            if err.is_timeout() {
                RelayError::Transport(format!(
                    "backend request timed out after {}s",
                    self.request_timeout.as_secs()
                ))
            } else {
                RelayError::Transport(format!("backend request failed: {err}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = match tokio::time::timeout(self.request_timeout, response.bytes()).await {
            Ok(Ok(body)) => body,
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "failed to read backend error body");
                Bytes::new()
            }
            Err(_) => Bytes::new(),
        };
        Err(RelayError::Upstream {
            status: status.as_u16(),
            message: sanitize_backend_error(status, &body),
        })
    }
}

fn truncate_chars(text: &str) -> String {
    match text.char_indices().nth(ERROR_BODY_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Extract a short, printable message from a backend error body.
pub(crate) fn sanitize_backend_error(status: http::StatusCode, body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        // OpenAI-style: { "error": { "message": "..." } }
        if let Some(msg) = json
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return truncate_chars(msg);
        }
        // Sider-style: { "code": 401, "msg": "..." }
        if let Some(msg) = json
            .get("msg")
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
        {
            return truncate_chars(msg);
        }
    }

    let raw = String::from_utf8_lossy(body);
    let raw = raw.trim();
    if raw.is_empty() {
        return format!("backend returned {status}");
    }
    truncate_chars(raw)
}
