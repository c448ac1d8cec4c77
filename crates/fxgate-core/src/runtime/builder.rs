//! Builder for initializing the fxgate runtime with configurable components.

use crate::{
    cache::ResponseCache,
    config::AppConfig,
    gateway::GatewayEngine,
    metrics::MetricsCollector,
    rate_limit::RateLimiter,
    transactions::TransactionTracker,
    upstream::{HealthChecker, HttpClient, RpcPool, RpcTransport},
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{lifecycle::FxgateRuntime, FxgateComponents};

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to initialize metrics collector: {0}")]
    MetricsInitialization(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("No RPC endpoints configured")]
    NoUpstreams,

    #[error("Runtime initialization failed: {0}")]
    Initialization(String),
}

#[derive(Clone)]
struct RuntimeOptions {
    enable_health_checker: bool,
    enable_background_tasks: bool,
    shutdown_channel_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            enable_health_checker: false,
            enable_background_tasks: true,
            shutdown_channel_capacity: 16,
        }
    }
}

/// Builder for constructing a [`FxgateRuntime`].
///
/// # Examples
///
/// ```no_run
/// # use fxgate_core::{config::AppConfig, runtime::FxgateRuntimeBuilder};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AppConfig::load()?;
///
/// let runtime = FxgateRuntimeBuilder::new()
///     .with_config(config)
///     .enable_health_checker()
///     .build()?;
///
/// runtime.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct FxgateRuntimeBuilder {
    config: Option<AppConfig>,
    transport: Option<Arc<dyn RpcTransport>>,
    options: RuntimeOptions,
}

impl FxgateRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: None, transport: None, options: RuntimeOptions::default() }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the `reqwest` transport, mainly for tests.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn RpcTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Enables periodic `eth_blockNumber` probes of every endpoint.
    ///
    /// Has no effect when `health_check.interval_seconds` is `0`.
    #[must_use]
    pub fn enable_health_checker(mut self) -> Self {
        self.options.enable_health_checker = true;
        self
    }

    #[must_use]
    pub fn disable_health_checker(mut self) -> Self {
        self.options.enable_health_checker = false;
        self
    }

    /// Skips the cache sweeper and the rate limiter eviction task.
    #[must_use]
    pub fn disable_background_tasks(mut self) -> Self {
        self.options.enable_background_tasks = false;
        self
    }

    /// Sets custom shutdown channel capacity (default: 16).
    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.options.shutdown_channel_capacity = capacity;
        self
    }

    /// Builds the runtime and starts its background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError` if configuration is missing or invalid, no endpoints are
    /// configured, or component initialization fails.
    pub fn build(self) -> Result<FxgateRuntime, RuntimeError> {
        let config = self.config.ok_or_else(|| {
            RuntimeError::ConfigValidation("No configuration provided".to_string())
        })?;

        if config.upstreams.rpc_urls.is_empty() {
            return Err(RuntimeError::NoUpstreams);
        }

        config.validate().map_err(RuntimeError::ConfigValidation)?;

        let health_check_interval =
            config.health_check_interval().filter(|_| self.options.enable_health_checker);

        info!(
            endpoints_count = config.upstreams.rpc_urls.len(),
            health_checker_enabled = health_check_interval.is_some(),
            background_tasks_enabled = self.options.enable_background_tasks,
            "initializing fxgate runtime"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(self.options.shutdown_channel_capacity);

        let metrics_collector = Arc::new(
            MetricsCollector::new()
                .map_err(|e| RuntimeError::MetricsInitialization(e.to_string()))?,
        );
        debug!("metrics collector initialized");

        let cache = Arc::new(ResponseCache::new(&config.cache));
        debug!(enabled = cache.is_enabled(), "response cache initialized");

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                HttpClient::new().map_err(|e| RuntimeError::Initialization(e.to_string()))?,
            ),
        };
        let pool = Arc::new(
            RpcPool::new(&config.upstreams.rpc_urls, transport, config.upstream_timeout())
                .map_err(|e| RuntimeError::Initialization(e.to_string()))?
                .with_cooldown(config.upstream_cooldown())
                .with_metrics(Arc::clone(&metrics_collector)),
        );
        info!(
            endpoints_count = pool.endpoints().len(),
            timeout_secs = pool.timeout().as_secs(),
            "rpc pool initialized"
        );

        let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        debug!(enabled = config.rate_limit.enabled, "rate limiter initialized");

        let tracker = Arc::new(TransactionTracker::from_config(&config.transactions));
        debug!(max_tracked = config.transactions.max_tracked, "transaction tracker initialized");

        let gateway = Arc::new(
            GatewayEngine::new(Arc::clone(&cache), Arc::clone(&pool))
                .with_tracker(Arc::clone(&tracker))
                .with_metrics(Arc::clone(&metrics_collector)),
        );

        let health_checker = health_check_interval.map(|interval| {
            Arc::new(
                HealthChecker::new(Arc::clone(&pool), interval)
                    .with_metrics(Arc::clone(&metrics_collector)),
            )
        });

        let components = FxgateComponents::new(
            metrics_collector,
            cache,
            pool,
            rate_limiter,
            tracker,
            gateway,
            health_checker,
        );

        let runtime = FxgateRuntime::new(
            components,
            shutdown_tx,
            config,
            self.options.enable_background_tasks,
        );

        info!("fxgate runtime initialization complete");

        Ok(runtime)
    }
}

impl Default for FxgateRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
