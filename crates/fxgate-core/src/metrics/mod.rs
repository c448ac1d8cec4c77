//! # Metrics
//!
//! Prometheus metrics recorded through the `metrics` facade.
//!
//! All recording goes through lock-free counters, gauges and histograms, so the hot
//! path never blocks. The exporter handle is process-global because the `metrics`
//! recorder itself is; everything else is owned by [`MetricsCollector`].
//!
//! ## Label Cardinality
//!
//! Endpoint URLs are interned once and reused as `'static` labels. The endpoint list is
//! fixed at startup, so the intern pool is bounded. Client identities are never used as
//! labels.

use crate::upstream::errors::UpstreamError;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{borrow::Cow, sync::OnceLock};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

static ENDPOINT_NAME_POOL: OnceLock<dashmap::DashMap<String, &'static str>> = OnceLock::new();

#[inline]
fn endpoint_to_static(endpoint: &str) -> Cow<'static, str> {
    let pool = ENDPOINT_NAME_POOL.get_or_init(dashmap::DashMap::new);

    if let Some(interned) = pool.get(endpoint) {
        return Cow::Borrowed(*interned);
    }

    let owned = endpoint.to_string();
    let leaked: &'static str = Box::leak(owned.clone().into_boxed_str());
    pool.insert(owned, leaked);
    Cow::Borrowed(leaked)
}

#[inline]
fn method_to_static(method: &str) -> Cow<'static, str> {
    match crate::types::ALLOWED_METHODS.iter().find(|allowed| **allowed == method) {
        Some(allowed) => Cow::Borrowed(*allowed),
        None => Cow::Borrowed("other"),
    }
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "using fallback Prometheus recorder, metrics may not be globally visible"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    /// # Errors
    ///
    /// Returns an error if the Prometheus recorder cannot be initialized.
    pub fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self { prometheus_handle: init_prometheus_recorder() })
    }

    /// Record a served read, whether from cache or upstream.
    pub fn record_request(&self, method: &str, success: bool, latency_ms: u64) {
        let method_cow = method_to_static(method);

        counter!("fxgate_requests_total", "method" => method_cow.clone()).increment(1);
        #[allow(clippy::cast_precision_loss)]
        histogram!("fxgate_request_duration_seconds", "method" => method_cow.clone())
            .record(latency_ms as f64 / 1000.0);

        if !success {
            counter!("fxgate_requests_error_total", "method" => method_cow).increment(1);
        }
    }

    pub fn record_cache_hit(&self, method: &str) {
        counter!("fxgate_cache_hits_total", "method" => method_to_static(method)).increment(1);
    }

    pub fn record_cache_miss(&self, method: &str) {
        counter!("fxgate_cache_misses_total", "method" => method_to_static(method)).increment(1);
    }

    pub fn record_cache_stats(&self, entries: usize, hit_rate: f64) {
        #[allow(clippy::cast_precision_loss)]
        gauge!("fxgate_cache_entries").set(entries as f64);
        gauge!("fxgate_cache_hit_rate").set(hit_rate);
    }

    /// Record one attempt against one endpoint.
    pub fn record_upstream_attempt(&self, endpoint: &str, success: bool, latency_ms: u64) {
        let endpoint_cow = endpoint_to_static(endpoint);

        counter!("fxgate_upstream_attempts_total", "endpoint" => endpoint_cow.clone()).increment(1);
        #[allow(clippy::cast_precision_loss)]
        histogram!("fxgate_upstream_duration_seconds", "endpoint" => endpoint_cow.clone())
            .record(latency_ms as f64 / 1000.0);

        if success {
            counter!("fxgate_upstream_success_total", "endpoint" => endpoint_cow).increment(1);
        }
    }

    pub fn record_upstream_error(&self, endpoint: &str, error: &UpstreamError) {
        counter!(
            "fxgate_upstream_errors_total",
            "endpoint" => endpoint_to_static(endpoint),
            "error_type" => error.kind()
        )
        .increment(1);
    }

    /// Record a call answered by an endpoint other than the first one tried.
    pub fn record_failover(&self, endpoint: &str, skipped: usize) {
        counter!("fxgate_upstream_failovers_total", "endpoint" => endpoint_to_static(endpoint))
            .increment(1);
        #[allow(clippy::cast_precision_loss)]
        histogram!("fxgate_upstream_failover_depth").record(skipped as f64);
    }

    pub fn record_upstream_unavailable(&self) {
        counter!("fxgate_upstream_unavailable_total").increment(1);
    }

    pub fn record_upstream_health(&self, endpoint: &str, is_healthy: bool) {
        let health_value = if is_healthy { 1.0 } else { 0.0 };
        gauge!("fxgate_upstream_health", "endpoint" => endpoint_to_static(endpoint))
            .set(health_value);
    }

    pub fn record_healthy_upstream_count(&self, count: usize) {
        #[allow(clippy::cast_precision_loss)]
        gauge!("fxgate_healthy_upstreams").set(count as f64);
    }

    pub fn record_health_check(&self, endpoint: &str, success: bool, response_time_ms: u64) {
        let endpoint_cow = endpoint_to_static(endpoint);

        #[allow(clippy::cast_precision_loss)]
        histogram!("fxgate_health_check_duration_seconds", "endpoint" => endpoint_cow.clone())
            .record(response_time_ms as f64 / 1000.0);

        if success {
            counter!("fxgate_health_check_success_total", "endpoint" => endpoint_cow).increment(1);
        } else {
            counter!("fxgate_health_check_failure_total", "endpoint" => endpoint_cow).increment(1);
        }
    }

    /// Record an admission decision. `window` names the exhausted window on rejection.
    pub fn record_rate_limit(&self, allowed: bool, window: Option<&'static str>) {
        if allowed {
            counter!("fxgate_rate_limit_allowed_total").increment(1);
        } else {
            counter!("fxgate_rate_limit_rejected_total", "window" => window.unwrap_or("capacity"))
                .increment(1);
        }
    }

    pub fn record_rate_limit_clients(&self, count: usize) {
        #[allow(clippy::cast_precision_loss)]
        gauge!("fxgate_rate_limit_clients").set(count as f64);
    }

    /// Get current metrics in Prometheus text exposition format.
    #[must_use]
    pub fn get_prometheus_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}
