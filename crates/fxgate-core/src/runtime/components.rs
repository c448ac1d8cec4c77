//! Component container for the fxgate runtime.

use crate::{
    cache::ResponseCache,
    gateway::GatewayEngine,
    metrics::MetricsCollector,
    rate_limit::RateLimiter,
    transactions::TransactionTracker,
    upstream::{HealthChecker, RpcPool},
};
use std::sync::Arc;

/// Every long-lived component, shared by `Arc` with request handlers.
#[derive(Clone)]
pub struct FxgateComponents {
    metrics_collector: Arc<MetricsCollector>,
    cache: Arc<ResponseCache>,
    pool: Arc<RpcPool>,
    rate_limiter: Arc<RateLimiter>,
    tracker: Arc<TransactionTracker>,
    gateway: Arc<GatewayEngine>,
    health_checker: Option<Arc<HealthChecker>>,
}

impl FxgateComponents {
    /// Called by `FxgateRuntimeBuilder` during initialization.
    #[must_use]
    pub fn new(
        metrics_collector: Arc<MetricsCollector>,
        cache: Arc<ResponseCache>,
        pool: Arc<RpcPool>,
        rate_limiter: Arc<RateLimiter>,
        tracker: Arc<TransactionTracker>,
        gateway: Arc<GatewayEngine>,
        health_checker: Option<Arc<HealthChecker>>,
    ) -> Self {
        Self { metrics_collector, cache, pool, rate_limiter, tracker, gateway, health_checker }
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.metrics_collector
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<RpcPool> {
        &self.pool
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<TransactionTracker> {
        &self.tracker
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<GatewayEngine> {
        &self.gateway
    }

    /// Returns `None` if health checking was disabled during runtime initialization.
    #[must_use]
    pub fn health_checker(&self) -> Option<&Arc<HealthChecker>> {
        self.health_checker.as_ref()
    }

    #[must_use]
    pub fn has_health_checker(&self) -> bool {
        self.health_checker.is_some()
    }
}
