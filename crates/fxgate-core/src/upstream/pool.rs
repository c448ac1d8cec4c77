//! Ordered endpoint pool with failover.
//!
//! A call walks the endpoints in priority order and returns the first success. Every
//! failure marks that endpoint unhealthy and moves on; when the list is exhausted the
//! caller gets [`UpstreamError::Unavailable`] naming each endpoint tried and why it
//! failed. Health never removes an endpoint from the walk, so a node that recovers is
//! picked up again on the next call.
//!
//! With a cooldown configured, endpoints that failed within the cooldown are tried
//! after the others instead of first. They are still tried.
//!
//! The last round of active health checks is kept so read-only health views can
//! reuse it through [`RpcPool::recent_health`] instead of calling every node per
//! request.

use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, error, info, warn};

use super::{
    endpoint::{EndpointStatus, RpcEndpoint},
    errors::{EndpointFailure, UpstreamError},
    http_client::{HttpClient, RpcTransport},
};
use crate::{config::UpstreamsConfig, metrics::MetricsCollector, types::JsonRpcRequest};

/// Reachability of one endpoint as last observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointHealth {
    pub url: String,
    pub healthy: bool,
}

/// Result of an active `eth_blockNumber` probe against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub url: String,
    pub healthy: bool,
    pub block_number: Option<u64>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Failover pool over the configured RPC endpoints.
pub struct RpcPool {
    endpoints: Vec<Arc<RpcEndpoint>>,
    transport: Arc<dyn RpcTransport>,
    timeout: Duration,
    cooldown: Option<Duration>,
    next_id: AtomicU64,
    metrics: Option<Arc<MetricsCollector>>,
    last_check: Mutex<Option<(Instant, Vec<ProbeResult>)>>,
}

impl RpcPool {
    /// Creates a pool over `urls`, preferring earlier entries.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::NoEndpoints`] if `urls` is empty.
    pub fn new(
        urls: &[String],
        transport: Arc<dyn RpcTransport>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        if urls.is_empty() {
            return Err(UpstreamError::NoEndpoints);
        }

        let endpoints = urls
            .iter()
            .enumerate()
            .map(|(priority, url)| Arc::new(RpcEndpoint::new(url.as_str(), priority)))
            .collect();

        Ok(Self {
            endpoints,
            transport,
            timeout,
            cooldown: None,
            next_id: AtomicU64::new(1),
            metrics: None,
            last_check: Mutex::new(None),
        })
    }

    /// Builds the production pool from configuration with the `reqwest` transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or no URLs are configured.
    pub fn from_config(config: &UpstreamsConfig) -> Result<Self, UpstreamError> {
        let transport: Arc<dyn RpcTransport> = Arc::new(HttpClient::new()?);
        let pool = Self::new(&config.rpc_urls, transport, Duration::from_secs(config.timeout_seconds))?;
        Ok(pool.with_cooldown(
            (config.cooldown_seconds > 0).then(|| Duration::from_secs(config.cooldown_seconds)),
        ))
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Option<Duration>) -> Self {
        self.cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn endpoints(&self) -> &[Arc<RpcEndpoint>] {
        &self.endpoints
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Endpoints in the order the next call will try them.
    fn attempt_order(&self) -> Vec<Arc<RpcEndpoint>> {
        let Some(cooldown) = self.cooldown else {
            return self.endpoints.clone();
        };

        let now = Instant::now();
        let (cooling, ready): (Vec<_>, Vec<_>) = self
            .endpoints
            .iter()
            .cloned()
            .partition(|endpoint| endpoint.failed_within(cooldown, now));

        ready.into_iter().chain(cooling).collect()
    }

    fn serialize_request(&self, method: &str, params: Vec<Value>) -> Result<Bytes, UpstreamError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, params, Value::from(id));
        serde_json::to_vec(&request)
            .map(Bytes::from)
            .map_err(|e| UpstreamError::InvalidRequest(format!("Failed to serialize request: {e}")))
    }

    /// Calls `method` with positional `params`, failing over across endpoints.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::RpcError`] immediately when a node reports a client-side error
    ///   (invalid params, execution reverted), since every node would say the same
    /// - [`UpstreamError::Unavailable`] when every endpoint failed
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, UpstreamError> {
        let body = self.serialize_request(method, params)?;
        let order = self.attempt_order();
        let mut attempts = Vec::with_capacity(order.len());

        for (position, endpoint) in order.iter().enumerate() {
            let started = Instant::now();
            let result = endpoint.send(self.transport.as_ref(), body.clone(), self.timeout).await;
            let latency = started.elapsed();
            let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(value) => {
                    endpoint.record_success(latency);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_upstream_attempt(endpoint.url(), true, latency_ms);
                        if position > 0 {
                            metrics.record_failover(endpoint.url(), position);
                        }
                    }
                    if position > 0 {
                        info!(
                            method = %method,
                            endpoint = %endpoint.url(),
                            skipped = position,
                            "rpc call served after failover"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !e.should_failover() => {
                    debug!(
                        method = %method,
                        endpoint = %endpoint.url(),
                        error = %e,
                        "rpc call rejected by node, not failing over"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_upstream_attempt(endpoint.url(), false, latency_ms);
                        metrics.record_upstream_error(endpoint.url(), &e);
                    }
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        method = %method,
                        endpoint = %endpoint.url(),
                        error = %e,
                        latency_ms = latency_ms,
                        "rpc endpoint failed, trying next"
                    );
                    endpoint.record_failure(&e);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_upstream_attempt(endpoint.url(), false, latency_ms);
                        metrics.record_upstream_error(endpoint.url(), &e);
                        metrics.record_upstream_health(endpoint.url(), false);
                    }
                    attempts.push(EndpointFailure {
                        url: endpoint.url().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        error!(method = %method, attempted = attempts.len(), "all rpc endpoints failed");
        if let Some(metrics) = &self.metrics {
            metrics.record_upstream_unavailable();
        }
        Err(UpstreamError::Unavailable { attempts })
    }

    /// Last known health of each endpoint, in priority order.
    #[must_use]
    pub fn health_snapshot(&self) -> Vec<EndpointHealth> {
        self.endpoints
            .iter()
            .map(|endpoint| EndpointHealth {
                url: endpoint.url().to_string(),
                healthy: endpoint.is_healthy(),
            })
            .collect()
    }

    /// Full per-endpoint bookkeeping, in priority order.
    #[must_use]
    pub fn detailed_snapshot(&self) -> Vec<EndpointStatus> {
        self.endpoints.iter().map(|endpoint| endpoint.status()).collect()
    }

    #[must_use]
    pub fn healthy_count(&self) -> usize {
        self.endpoints.iter().filter(|endpoint| endpoint.is_healthy()).count()
    }

    /// Sends `eth_blockNumber` to every endpoint concurrently and updates their health.
    ///
    /// Unlike [`RpcPool::call`] there is no failover: each endpoint answers for itself.
    pub async fn probe_all(&self) -> Vec<ProbeResult> {
        let mut last_check = self.last_check.lock().await;
        let results = self.check_endpoints().await;
        *last_check = Some((Instant::now(), results.clone()));
        results
    }

    /// Returns the last round of health checks if it is younger than `max_age`,
    /// otherwise checks every endpoint again.
    ///
    /// Concurrent callers that find the results stale wait for a single new round.
    pub async fn recent_health(&self, max_age: Duration) -> Vec<ProbeResult> {
        let mut last_check = self.last_check.lock().await;
        if let Some((checked_at, results)) = last_check.as_ref() {
            if checked_at.elapsed() < max_age {
                return results.clone();
            }
        }

        let results = self.check_endpoints().await;
        *last_check = Some((Instant::now(), results.clone()));
        results
    }

    async fn check_endpoints(&self) -> Vec<ProbeResult> {
        let probes = self.endpoints.iter().map(|endpoint| self.probe(endpoint));
        join_all(probes).await
    }

    async fn probe(&self, endpoint: &RpcEndpoint) -> ProbeResult {
        let body = match self.serialize_request("eth_blockNumber", Vec::new()) {
            Ok(body) => body,
            Err(e) => {
                return ProbeResult {
                    url: endpoint.url().to_string(),
                    healthy: endpoint.is_healthy(),
                    block_number: None,
                    latency_ms: None,
                    error: Some(e.to_string()),
                }
            }
        };

        let started = Instant::now();
        let result = endpoint.send(self.transport.as_ref(), body, self.timeout).await;
        let latency = started.elapsed();
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);

        let outcome = result.and_then(|value| {
            parse_hex_u64(&value).ok_or_else(|| {
                UpstreamError::InvalidResponse(format!("unexpected block number: {value}"))
            })
        });

        if let Some(metrics) = &self.metrics {
            metrics.record_health_check(endpoint.url(), outcome.is_ok(), latency_ms);
            metrics.record_upstream_health(endpoint.url(), outcome.is_ok());
        }

        match outcome {
            Ok(block_number) => {
                endpoint.record_success(latency);
                ProbeResult {
                    url: endpoint.url().to_string(),
                    healthy: true,
                    block_number: Some(block_number),
                    latency_ms: Some(latency_ms),
                    error: None,
                }
            }
            Err(e) => {
                endpoint.record_failure(&e);
                ProbeResult {
                    url: endpoint.url().to_string(),
                    healthy: false,
                    block_number: None,
                    latency_ms: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Parses a `0x`-prefixed hex quantity.
#[must_use]
pub fn parse_hex_u64(value: &Value) -> Option<u64> {
    let hex = value.as_str()?.strip_prefix("0x")?;
    u64::from_str_radix(hex, 16).ok()
}
