use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

use crate::upstream::UpstreamError;

/// Moves a serialized JSON-RPC body to an endpoint and returns the raw response body.
///
/// The pool only talks to nodes through this trait, so tests can script endpoint
/// behaviour without sockets.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Posts `body` to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] for transport failures and non-2xx statuses.
    async fn post(&self, url: &str, body: Bytes, timeout: Duration) -> Result<Bytes, UpstreamError>;
}

const MAX_ERROR_BODY_CHARS: usize = 256;

/// Pooled `reqwest` client used for every upstream call.
///
/// A single attempt is never retried here; retrying is the pool's job and it always
/// moves to the next endpoint.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with pooled keep-alive connections and rustls.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new() -> Result<Self, UpstreamError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(100)
            .connect_timeout(Duration::from_secs(5))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("fxgate/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                UpstreamError::ConnectionFailed(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self { client })
    }

    /// Sanitizes network errors so upstream URLs with credentials are not echoed back.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_timeout() {
            "connection timed out".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_decode() {
            "response decode error".to_string()
        } else if error.is_redirect() {
            "unexpected redirect".to_string()
        } else {
            "network error".to_string()
        }
    }
}

fn truncate_body(raw: &str) -> String {
    if raw.chars().count() > MAX_ERROR_BODY_CHARS {
        let head: String = raw.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{head}... (truncated)")
    } else {
        raw.to_string()
    }
}

#[async_trait]
impl RpcTransport for HttpClient {
    async fn post(&self, url: &str, body: Bytes, timeout: Duration) -> Result<Bytes, UpstreamError> {
        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::ConnectionFailed(Self::sanitize_network_error(&e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return response.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::Network(e)
                }
            });
        }

        let raw_text = response.text().await.unwrap_or_default();
        tracing::trace!(status = status.as_u16(), "upstream returned non-success status");
        Err(UpstreamError::HttpError(status.as_u16(), truncate_body(&raw_text)))
    }
}
