//! Read pipeline shared by every HTTP route.
//!
//! A read is keyed by method and params, looked up in the [`ResponseCache`], and on a
//! miss forwarded to the [`RpcPool`]. Rate limiting happens before this layer, in the
//! HTTP middleware, so a rejected request never reaches it.
//!
//! Broadcasts are the one write: they skip the cache and register the returned hash
//! with the [`TransactionTracker`].

pub mod validation;

use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    cache::{cache_key, ResponseCache, TtlClass},
    metrics::MetricsCollector,
    transactions::{ReceiptOutcome, TrackedTransaction, TransactionTracker},
    types::{is_method_cacheable, CacheStatus, JsonRpcRequest},
    upstream::{parse_hex_u64, RpcPool, UpstreamError},
};

pub use validation::{
    validate_address, validate_raw_transaction, validate_tx_hash, ValidationError,
};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Preserves the concrete `UpstreamError` so the HTTP layer can pick a status.
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A result and how it was obtained.
#[derive(Debug, Clone)]
pub struct Served {
    pub value: Arc<Value>,
    pub cache_status: CacheStatus,
}

/// Cache-then-pool read path.
pub struct GatewayEngine {
    cache: Arc<ResponseCache>,
    pool: Arc<RpcPool>,
    tracker: Arc<TransactionTracker>,
    metrics_collector: Option<Arc<MetricsCollector>>,
}

impl GatewayEngine {
    #[must_use]
    pub fn new(cache: Arc<ResponseCache>, pool: Arc<RpcPool>) -> Self {
        Self {
            cache,
            pool,
            tracker: Arc::new(TransactionTracker::default()),
            metrics_collector: None,
        }
    }

    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<TransactionTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics_collector: Arc<MetricsCollector>) -> Self {
        self.metrics_collector = Some(metrics_collector);
        self
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
    pub fn tracker(&self) -> &Arc<TransactionTracker> {
        &self.tracker
    }

    /// Serves `method(params)` from cache when possible, otherwise from upstream.
    ///
    /// Successful non-null results are stored under the TTL of `ttl_class`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Upstream`] when the pool could not produce a result.
    pub async fn read(
        &self,
        method: &str,
        params: Vec<Value>,
        ttl_class: TtlClass,
    ) -> Result<Served, GatewayError> {
        let key = cache_key(method, &params);
        let ttl = self.cache.ttl_for(ttl_class);
        let started = Instant::now();

        let result = self.cache.get_or_fetch(&key, ttl, || self.pool.call(method, params)).await;
        self.record(method, started, result.as_ref().ok().map(|(_, status)| *status));

        let (value, cache_status) = result?;
        debug!(method = %method, cache_status = %cache_status, "read served");
        Ok(Served { value, cache_status })
    }

    /// Forwards a request without consulting the cache.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Upstream`] when the pool could not produce a result.
    pub async fn fetch(&self, method: &str, params: Vec<Value>) -> Result<Served, GatewayError> {
        let started = Instant::now();
        let result = self.pool.call(method, params).await;
        self.record(method, started, result.as_ref().ok().map(|_| CacheStatus::Miss));

        Ok(Served { value: Arc::new(result?), cache_status: CacheStatus::Miss })
    }

    fn record(&self, method: &str, started: Instant, outcome: Option<CacheStatus>) {
        let Some(metrics) = &self.metrics_collector else {
            return;
        };

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        metrics.record_request(method, outcome.is_some(), latency_ms);
        match outcome {
            Some(CacheStatus::Hit) => metrics.record_cache_hit(method),
            Some(CacheStatus::Miss) | None => metrics.record_cache_miss(method),
        }
    }

    /// # Errors
    ///
    /// Propagates upstream failures.
    pub async fn block_number(&self) -> Result<Served, GatewayError> {
        self.read("eth_blockNumber", Vec::new(), TtlClass::Short).await
    }

    /// # Errors
    ///
    /// Propagates upstream failures.
    pub async fn chain_id(&self) -> Result<Served, GatewayError> {
        self.read("eth_chainId", Vec::new(), TtlClass::Long).await
    }

    /// # Errors
    ///
    /// Propagates upstream failures.
    pub async fn gas_price(&self) -> Result<Served, GatewayError> {
        self.read("eth_gasPrice", Vec::new(), TtlClass::Short).await
    }

    /// Balance of `address` at the latest block, in wei as a hex quantity.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidAddress`] before any upstream work, or an
    /// upstream failure.
    pub async fn balance(&self, address: &str) -> Result<Served, GatewayError> {
        validate_address(address)?;
        self.read(
            "eth_getBalance",
            vec![Value::from(address.to_ascii_lowercase()), Value::from("latest")],
            TtlClass::Short,
        )
        .await
    }

    /// Receipt for `hash`, or `null` while the transaction is pending.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTxHash`] before any upstream work, or an
    /// upstream failure.
    pub async fn transaction_receipt(&self, hash: &str) -> Result<Served, GatewayError> {
        validate_tx_hash(hash)?;
        self.read(
            "eth_getTransactionReceipt",
            vec![Value::from(hash.to_ascii_lowercase())],
            TtlClass::Short,
        )
        .await
    }

    /// Submits a signed transaction and starts tracking the hash the node returns.
    ///
    /// Goes upstream on every call. The returned record is pending.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidRawTransaction`] before any upstream work, the
    /// node's rejection as an upstream RPC error, or
    /// [`UpstreamError::InvalidResponse`] when the node answers with something other
    /// than a transaction hash.
    pub async fn broadcast(&self, raw_transaction: &str) -> Result<TrackedTransaction, GatewayError> {
        validate_raw_transaction(raw_transaction)?;
        let served =
            self.fetch("eth_sendRawTransaction", vec![Value::from(raw_transaction)]).await?;

        let hash = served
            .value
            .as_str()
            .filter(|hash| validate_tx_hash(hash).is_ok())
            .ok_or_else(|| {
                UpstreamError::InvalidResponse(format!(
                    "expected a transaction hash, got {}",
                    served.value
                ))
            })?;

        info!(hash = %hash, "transaction broadcast");
        Ok(self.tracker.track(hash).unwrap_or_else(|| TrackedTransaction::untracked(hash)))
    }

    /// Current status of `hash`: confirmed or failed once a receipt exists, otherwise
    /// pending if this gateway broadcast it, otherwise not found.
    ///
    /// A receipt also updates the tracked entry. Confirmations are omitted when the
    /// latest block number cannot be read.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTxHash`] before any upstream work, or an
    /// upstream failure of the receipt lookup.
    pub async fn transaction_status(&self, hash: &str) -> Result<TrackedTransaction, GatewayError> {
        let receipt = self.transaction_receipt(hash).await?;
        if receipt.value.is_null() {
            return Ok(self.tracker.get(hash).unwrap_or_else(|| TrackedTransaction::not_found(hash)));
        }

        let latest_block = match self.block_number().await {
            Ok(served) => parse_hex_u64(&served.value),
            Err(e) => {
                debug!(error = %e, "latest block unavailable, omitting confirmations");
                None
            }
        };
        let outcome = ReceiptOutcome::from_receipt(&receipt.value, latest_block);

        Ok(self
            .tracker
            .update(hash, &outcome)
            .unwrap_or_else(|| TrackedTransaction::from_outcome(hash, &outcome)))
    }

    /// Validates and forwards an allowlisted JSON-RPC request.
    ///
    /// Cacheable methods use the short TTL; the rest always go upstream.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for malformed or disallowed requests, or an
    /// upstream failure.
    pub async fn passthrough(&self, request: &JsonRpcRequest) -> Result<Served, GatewayError> {
        request.validate()?;
        let params = request.positional_params();

        if is_method_cacheable(&request.method) {
            self.read(&request.method, params, TtlClass::Short).await
        } else {
            self.fetch(&request.method, params).await
        }
    }
}
