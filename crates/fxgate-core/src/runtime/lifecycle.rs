//! Runtime lifecycle: background tasks and graceful shutdown.

use crate::{
    cache::{background::spawn_cache_sweeper, ResponseCache},
    config::AppConfig,
    gateway::GatewayEngine,
    metrics::MetricsCollector,
    rate_limit::RateLimiter,
    transactions::TransactionTracker,
    upstream::RpcPool,
};
use std::sync::Arc;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{builder::FxgateRuntimeBuilder, FxgateComponents};

/// Owns every component and the background tasks that maintain them.
///
/// Background tasks listen on a shared broadcast channel. [`FxgateRuntime::shutdown`]
/// signals it and waits for every maintenance task to exit. The health checker may be
/// mid-probe, so it is aborted.
pub struct FxgateRuntime {
    components: FxgateComponents,
    shutdown_tx: broadcast::Sender<()>,
    config: AppConfig,
    health_task: Option<JoinHandle<()>>,
    maintenance_tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl FxgateRuntime {
    #[must_use]
    pub fn builder() -> FxgateRuntimeBuilder {
        FxgateRuntimeBuilder::new()
    }

    pub(super) fn new(
        components: FxgateComponents,
        shutdown_tx: broadcast::Sender<()>,
        config: AppConfig,
        enable_background_tasks: bool,
    ) -> Self {
        let health_task = components.health_checker().map(|health_checker| {
            let handle = health_checker.start_with_shutdown(shutdown_tx.subscribe());
            debug!(interval_secs = health_checker.check_interval().as_secs(), "health checker task started");
            handle
        });

        let mut maintenance_tasks = Vec::new();
        if enable_background_tasks {
            if components.cache().is_enabled() {
                let handle = spawn_cache_sweeper(
                    Arc::clone(components.cache()),
                    config.sweep_interval(),
                    shutdown_tx.subscribe(),
                );
                maintenance_tasks.push(("cache sweeper", handle));
                debug!("cache sweeper task started");
            }

            if config.rate_limit.enabled {
                let handle = components
                    .rate_limiter()
                    .start_cleanup_task(config.eviction_interval(), shutdown_tx.subscribe());
                maintenance_tasks.push(("rate limiter eviction", handle));
                debug!("rate limiter eviction task started");
            }

            let handle = components
                .tracker()
                .start_cleanup_task(config.tx_cleanup_interval(), shutdown_tx.subscribe());
            maintenance_tasks.push(("transaction tracker cleanup", handle));
            debug!("transaction tracker cleanup task started");
        }

        Self { components, shutdown_tx, config, health_task, maintenance_tasks }
    }

    #[must_use]
    pub fn components(&self) -> &FxgateComponents {
        &self.components
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<GatewayEngine> {
        self.components.gateway()
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ResponseCache> {
        self.components.cache()
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<RpcPool> {
        self.components.pool()
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        self.components.rate_limiter()
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<TransactionTracker> {
        self.components.tracker()
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        self.components.metrics_collector()
    }

    /// Creates a new shutdown receiver for tasks owned outside the runtime.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signals every background task and waits for them to stop.
    ///
    /// Consumes the runtime, so it can only run once.
    pub async fn shutdown(self) {
        info!("initiating fxgate runtime shutdown");
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!(error = %e, "failed to send shutdown signal (no receivers)");
        }

        if let Some(health_task) = self.health_task {
            health_task.abort();
            debug!("health checker task aborted");
        }

        for (name, task) in self.maintenance_tasks {
            match task.await {
                Ok(()) => debug!(task = name, "background task completed"),
                Err(e) if e.is_cancelled() => debug!(task = name, "background task cancelled"),
                Err(e) => error!(task = name, error = %e, "background task failed"),
            }
        }

        info!("fxgate runtime shutdown complete");
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<FxgateRuntime>;
    let _ = assert_sync::<FxgateRuntime>;
};
