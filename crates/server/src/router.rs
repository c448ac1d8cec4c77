//! Routes and handlers.
//!
//! Health, root and metrics routes are public. Chain data routes, transaction
//! broadcast and the JSON-RPC passthrough sit behind the per-IP rate limiter when it
//! is enabled.
//!
//! The detailed health route serves a recent round of endpoint health checks instead
//! of calling every node on each hit.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fxgate_core::{
    config::AppConfig,
    gateway::{GatewayEngine, Served},
    metrics::MetricsCollector,
    rate_limit::RateLimiter,
    runtime::FxgateRuntime,
    types::{JsonRpcRequest, JsonRpcResponse},
    upstream::{parse_hex_u64, ProbeResult},
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
};

use crate::{
    error::ApiError,
    middleware::{
        create_request_id_layers, rate_limit_middleware, request_timeout_middleware,
        request_timing_middleware, require_json_middleware, RateLimitState, X_PROCESS_TIME,
        X_REQUEST_ID,
    },
};

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Oldest round of health checks `/v1/health/detailed` will serve.
const DETAILED_HEALTH_MAX_AGE: Duration = Duration::from_secs(10);

static X_CACHE_STATUS: HeaderName = HeaderName::from_static("x-cache-status");

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayEngine>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<MetricsCollector>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    #[must_use]
    pub fn from_runtime(runtime: &FxgateRuntime) -> Self {
        Self {
            gateway: Arc::clone(runtime.gateway()),
            rate_limiter: Arc::clone(runtime.rate_limiter()),
            metrics: Arc::clone(runtime.metrics_collector()),
            config: Arc::new(runtime.config().clone()),
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let exposed = [
        X_REQUEST_ID.clone(),
        X_PROCESS_TIME.clone(),
        X_CACHE_STATUS.clone(),
        HeaderName::from_static("retry-after"),
        HeaderName::from_static("x-ratelimit-limit-minute"),
        HeaderName::from_static("x-ratelimit-remaining-minute"),
        HeaderName::from_static("x-ratelimit-limit-hour"),
        HeaderName::from_static("x-ratelimit-remaining-hour"),
        HeaderName::from_static("x-ratelimit-limit-day"),
        HeaderName::from_static("x-ratelimit-remaining-day"),
    ];

    let origin = if allowed_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            allowed_origins.iter().filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, X_REQUEST_ID.clone()])
        .expose_headers(exposed)
}

/// Builds the complete application router.
pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let mut public = Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/v1/health", get(handle_health))
        .route("/v1/status", get(handle_status))
        .route("/v1/health/detailed", get(handle_detailed_health))
        .route("/v1/metrics", get(handle_metrics_summary));
    if config.metrics.enabled {
        public = public.route("/metrics", get(handle_prometheus_metrics));
    }

    let mut data = Router::new()
        .route("/v1/chain/block-number", get(handle_block_number))
        .route("/v1/chain/id", get(handle_chain_id))
        .route("/v1/chain/gas-price", get(handle_gas_price))
        .route("/v1/balances/{address}", get(handle_balance))
        .route("/v1/transactions/{hash}/receipt", get(handle_receipt))
        .route("/v1/transactions/{hash}/status", get(handle_transaction_status))
        .route(
            "/v1/transactions/broadcast",
            post(handle_broadcast).layer(middleware::from_fn(require_json_middleware)),
        )
        .route(
            "/v1/rpc",
            post(handle_rpc).layer(middleware::from_fn(require_json_middleware)),
        );
    if config.rate_limit.enabled {
        let rate_limit_state = RateLimitState::new(Arc::clone(&state.rate_limiter))
            .with_metrics(Arc::clone(&state.metrics));
        data = data.layer(middleware::from_fn_with_state(rate_limit_state, rate_limit_middleware));
    }

    let (set_request_id, propagate_request_id) = create_request_id_layers();

    public
        .merge(data)
        .fallback(handle_not_found)
        .with_state(state)
        .layer(middleware::from_fn_with_state(config.request_timeout(), request_timeout_middleware))
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config.server.allowed_origins))
        .layer(middleware::from_fn(request_timing_middleware))
        .layer(propagate_request_id)
        .layer(set_request_id)
}

fn cached_json(served: &Served, body: Value) -> Response {
    let mut response = Json(body).into_response();
    response
        .headers_mut()
        .insert(X_CACHE_STATUS.clone(), HeaderValue::from_static(served.cache_status.as_str()));
    response
}

/// Hex quantity plus its decimal value when it fits in `u64`.
fn quantity_body(field: &str, served: &Served) -> Value {
    let mut body = serde_json::Map::new();
    body.insert(field.to_string(), json!(parse_hex_u64(&served.value)));
    body.insert("hex".to_string(), (*served.value).clone());
    Value::Object(body)
}

async fn handle_root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "fxgate JSON-RPC gateway",
        "version": state.config.api_version,
        "health": format!("/{}/health", state.config.api_version),
    }))
}

async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "healthy", "version": state.config.api_version }))
}

async fn handle_status(State(state): State<AppState>) -> Json<Value> {
    let pool = state.gateway.pool();
    let cache = state.gateway.cache();
    let healthy = pool.healthy_count();
    let rpc_connected = healthy > 0;

    Json(json!({
        "status": if rpc_connected { "operational" } else { "degraded" },
        "version": state.config.api_version,
        "environment": state.config.environment,
        "rpc_connected": rpc_connected,
        "components": {
            "rpc": {
                "endpoints": pool.health_snapshot(),
                "healthy": healthy,
                "total": pool.endpoints().len(),
            },
            "cache": {
                "enabled": cache.is_enabled(),
                "size": cache.stats().size,
            },
            "rate_limit": {
                "enabled": state.config.rate_limit.enabled,
            },
        },
    }))
}

fn overall_health(results: &[ProbeResult]) -> &'static str {
    let reachable = results.iter().filter(|result| result.healthy).count();
    if reachable == results.len() {
        "healthy"
    } else if reachable == 0 {
        "unhealthy"
    } else {
        "degraded"
    }
}

async fn handle_detailed_health(State(state): State<AppState>) -> Json<Value> {
    let results = state.gateway.pool().recent_health(DETAILED_HEALTH_MAX_AGE).await;

    let rpc: serde_json::Map<String, Value> = results
        .iter()
        .map(|result| {
            let status = json!({
                "status": if result.healthy { "healthy" } else { "unhealthy" },
                "connected": result.healthy,
                "current_block": result.block_number,
                "latency_ms": result.latency_ms,
                "error": result.error,
            });
            (result.url.clone(), status)
        })
        .collect();

    Json(json!({
        "status": overall_health(&results),
        "version": state.config.api_version,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "checks": {
            "rpc": rpc,
            "cache": { "enabled": state.gateway.cache().is_enabled() },
        },
    }))
}

async fn handle_metrics_summary(State(state): State<AppState>) -> Json<Value> {
    let cache_stats = state.gateway.cache().stats();
    let limits = state.rate_limiter.limits();

    Json(json!({
        "cache": cache_stats,
        "rpc": {
            "endpoints": state.gateway.pool().detailed_snapshot(),
            "healthy": state.gateway.pool().healthy_count(),
        },
        "rate_limit": {
            "enabled": state.config.rate_limit.enabled,
            "limits": limits,
            "tracked_clients": state.rate_limiter.client_count(),
        },
        "transactions": state.gateway.tracker().stats(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn handle_prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.gateway.cache().stats();
    state.metrics.record_cache_stats(stats.size, stats.hit_rate);
    state.metrics.record_rate_limit_clients(state.rate_limiter.client_count());
    state.metrics.record_healthy_upstream_count(state.gateway.pool().healthy_count());

    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.get_prometheus_metrics(),
    )
}

async fn handle_block_number(State(state): State<AppState>) -> Result<Response, ApiError> {
    let served = state.gateway.block_number().await?;
    Ok(cached_json(&served, quantity_body("block_number", &served)))
}

async fn handle_chain_id(State(state): State<AppState>) -> Result<Response, ApiError> {
    let served = state.gateway.chain_id().await?;
    Ok(cached_json(&served, quantity_body("chain_id", &served)))
}

async fn handle_gas_price(State(state): State<AppState>) -> Result<Response, ApiError> {
    let served = state.gateway.gas_price().await?;
    Ok(cached_json(&served, quantity_body("gas_price_wei", &served)))
}

async fn handle_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Response, ApiError> {
    let served = state.gateway.balance(&address).await?;
    let body = json!({
        "address": address.to_ascii_lowercase(),
        "balance_wei": served.value.as_ref(),
        "block": "latest",
    });
    Ok(cached_json(&served, body))
}

async fn handle_receipt(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Response, ApiError> {
    let served = state.gateway.transaction_receipt(&hash).await?;
    let body = json!({
        "hash": hash.to_ascii_lowercase(),
        "pending": served.value.is_null(),
        "receipt": served.value.as_ref(),
    });
    Ok(cached_json(&served, body))
}

async fn handle_transaction_status(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let status = state.gateway.transaction_status(&hash).await?;
    let body = serde_json::to_value(status).map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
struct BroadcastRequest {
    #[serde(rename = "rawTransaction", alias = "raw_transaction")]
    raw_transaction: String,
}

async fn handle_broadcast(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: BroadcastRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid broadcast request: {e}")))?;

    let tx = state.gateway.broadcast(&request.raw_transaction).await?;
    Ok(Json(json!({
        "success": true,
        "transaction_hash": tx.transaction_hash,
        "status": tx.status,
    })))
}

async fn handle_rpc(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: JsonRpcRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON-RPC request: {e}")))?;

    let served = state.gateway.passthrough(&request).await?;
    let response = JsonRpcResponse::success((*served.value).clone(), request.id);
    let body = serde_json::to_value(response).map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(cached_json(&served, body))
}

async fn handle_not_found() -> ApiError {
    ApiError::not_found()
}
