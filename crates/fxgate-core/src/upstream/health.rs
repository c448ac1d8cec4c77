use crate::metrics::MetricsCollector;

use super::pool::{ProbeResult, RpcPool};
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, time::interval};
use tracing::{info, warn};

/// Periodically probes every endpoint with `eth_blockNumber`.
///
/// Probing only refreshes the advisory health flags; request routing never depends on
/// it. An endpoint that failed a live call recovers as soon as a probe succeeds.
pub struct HealthChecker {
    pool: Arc<RpcPool>,
    metrics_collector: Option<Arc<MetricsCollector>>,
    check_interval: Duration,
}

impl HealthChecker {
    #[must_use]
    pub fn new(pool: Arc<RpcPool>, check_interval: Duration) -> Self {
        Self { pool, metrics_collector: None, check_interval }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics_collector: Arc<MetricsCollector>) -> Self {
        self.metrics_collector = Some(metrics_collector);
        self
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    #[must_use]
    pub fn start_with_shutdown(
        &self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(&self.pool);
        let metrics_collector = self.metrics_collector.clone();
        let check_interval = self.check_interval;

        tokio::spawn(async move {
            let mut interval = interval(check_interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        Self::check_all_endpoints(&pool, metrics_collector.as_deref()).await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("health checker shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Probes every endpoint once and logs the outcome.
    pub async fn check_all_endpoints(
        pool: &RpcPool,
        metrics_collector: Option<&MetricsCollector>,
    ) -> Vec<ProbeResult> {
        let results = pool.probe_all().await;
        let healthy_count = results.iter().filter(|r| r.healthy).count();

        for result in &results {
            if result.healthy {
                info!(
                    endpoint = %result.url,
                    block_number = result.block_number,
                    latency_ms = result.latency_ms,
                    "health check passed for endpoint"
                );
            } else {
                warn!(
                    endpoint = %result.url,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "health check failed for endpoint"
                );
            }
        }

        if let Some(metrics) = metrics_collector {
            metrics.record_healthy_upstream_count(healthy_count);
        }

        results
    }
}
