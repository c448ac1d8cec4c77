//! Periodic sweep of expired cache entries.
//!
//! Lookups already drop expired entries they touch; the sweep reclaims entries that are
//! never read again. It runs on its own interval until the runtime broadcasts shutdown.

use super::ResponseCache;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info};

/// Runs the sweep loop until `shutdown_rx` fires.
pub async fn run_cache_sweeper(
    cache: Arc<ResponseCache>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    if !cache.is_enabled() {
        info!("cache disabled, sweeper not started");
        return;
    }

    info!(interval_secs = interval.as_secs(), "starting background cache sweep task");

    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately; nothing can have expired yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = cache.sweep_expired();
                #[allow(clippy::cast_precision_loss)]
                metrics::gauge!("fxgate_cache_entries").set(cache.stats().size as f64);
                debug!(removed = removed, "cache sweep complete");
            }
            _ = shutdown_rx.recv() => {
                debug!("cache sweep task shutting down");
                break;
            }
        }
    }
}

/// Spawns [`run_cache_sweeper`] on the current runtime.
pub fn spawn_cache_sweeper(
    cache: Arc<ResponseCache>,
    interval: Duration,
    shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(run_cache_sweeper(cache, interval, shutdown_rx))
}
