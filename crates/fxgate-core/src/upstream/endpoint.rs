use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::Instant;

use super::{errors::UpstreamError, http_client::RpcTransport};
use crate::types::JsonRpcResponse;

/// Read-only view of one endpoint for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStatus {
    pub url: String,
    pub priority: usize,
    pub healthy: bool,
    pub consecutive_failures: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub last_latency_ms: Option<u64>,
    pub last_error: Option<String>,
}

/// One configured upstream node.
///
/// Health is advisory: it is updated after every attempt and reported in snapshots,
/// but the pool never skips an endpoint because of it. Endpoints start healthy.
#[derive(Debug)]
pub struct RpcEndpoint {
    url: Arc<str>,
    priority: usize,
    healthy: AtomicBool,
    consecutive_failures: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    /// `u64::MAX` until the first successful attempt.
    last_latency_ms: AtomicU64,
    last_error: Mutex<Option<String>>,
    last_failure_at: Mutex<Option<Instant>>,
}

impl RpcEndpoint {
    #[must_use]
    pub fn new(url: impl Into<Arc<str>>, priority: usize) -> Self {
        Self {
            url: url.into(),
            priority,
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            last_latency_ms: AtomicU64::new(u64::MAX),
            last_error: Mutex::new(None),
            last_failure_at: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Position in the configured list; `0` is preferred.
    #[must_use]
    pub fn priority(&self) -> usize {
        self.priority
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Posts an already serialized JSON-RPC request and extracts its result.
    ///
    /// The whole attempt, including reading the body, is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::Timeout`] if the attempt exceeds `timeout`
    /// - [`UpstreamError::InvalidResponse`] if the body is not a JSON-RPC response
    /// - [`UpstreamError::RpcError`] if the node returned an error object
    /// - transport errors from [`RpcTransport::post`]
    pub async fn send(
        &self,
        transport: &dyn RpcTransport,
        body: Bytes,
        timeout: Duration,
    ) -> Result<serde_json::Value, UpstreamError> {
        tracing::debug!(endpoint = %self.url, healthy = self.is_healthy(), "sending request to endpoint");

        let response_bytes =
            match tokio::time::timeout(timeout, transport.post(&self.url, body, timeout)).await {
                Ok(result) => result?,
                Err(_) => return Err(UpstreamError::Timeout),
            };

        let response: JsonRpcResponse = serde_json::from_slice(&response_bytes)
            .map_err(|e| UpstreamError::InvalidResponse(format!("Invalid JSON: {e}")))?;

        response
            .into_result()
            .map_err(|error| UpstreamError::RpcError(error.code, error.message))?
            .ok_or_else(|| {
                UpstreamError::InvalidResponse("response has neither result nor error".to_string())
            })
    }

    /// Marks the endpoint healthy and records the attempt latency.
    pub fn record_success(&self, latency: Duration) {
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX - 1);
        self.healthy.store(true, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);
    }

    /// Marks the endpoint unhealthy and remembers why.
    pub fn record_failure(&self, error: &UpstreamError) {
        self.healthy.store(false, Ordering::Release);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
        *self.last_failure_at.lock() = Some(Instant::now());
    }

    /// Returns `true` if the most recent failure happened less than `window` ago.
    #[must_use]
    pub fn failed_within(&self, window: Duration, now: Instant) -> bool {
        self.last_failure_at
            .lock()
            .is_some_and(|failed_at| now.saturating_duration_since(failed_at) < window)
    }

    #[must_use]
    pub fn status(&self) -> EndpointStatus {
        let last_latency_ms = match self.last_latency_ms.load(Ordering::Relaxed) {
            u64::MAX => None,
            latency => Some(latency),
        };

        EndpointStatus {
            url: self.url.to_string(),
            priority: self.priority,
            healthy: self.is_healthy(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            last_latency_ms,
            last_error: self.last_error.lock().clone(),
        }
    }
}
