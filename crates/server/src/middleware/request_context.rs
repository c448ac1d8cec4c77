//! Per-request identity and timing.
//!
//! Every response carries `X-Request-ID` (taken from the request or generated as a
//! UUID v4) and `X-Process-Time` (handler wall time in seconds). Each request is
//! logged once on completion with its id, method, path, status and duration.

use axum::{
    body::Body,
    extract::State,
    http::{header::HeaderValue, HeaderName, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tokio::time::Instant;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use uuid::Uuid;

use crate::error::ApiError;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub static X_PROCESS_TIME: HeaderName = HeaderName::from_static("x-process-time");

#[derive(Clone, Copy, Default)]
pub struct UuidRequestIdGenerator;

impl MakeRequestId for UuidRequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        Some(RequestId::new(HeaderValue::from_str(&id).ok()?))
    }
}

/// Returns `(set, propagate)`; apply as `.layer(propagate).layer(set)` so the id is set
/// before anything inside reads it.
#[must_use]
pub fn create_request_id_layers() -> (
    SetRequestIdLayer<UuidRequestIdGenerator>,
    PropagateRequestIdLayer,
) {
    (
        SetRequestIdLayer::new(X_REQUEST_ID.clone(), UuidRequestIdGenerator),
        PropagateRequestIdLayer::new(X_REQUEST_ID.clone()),
    )
}

/// Adds `X-Process-Time` and logs the completed request.
pub async fn request_timing_middleware(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let request_id = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_owned();

    let mut response = next.run(request).await;

    let elapsed = started.elapsed();
    let process_time = format!("{:.4}", elapsed.as_secs_f64());
    if let Ok(value) = HeaderValue::from_str(&process_time) {
        response.headers_mut().insert(X_PROCESS_TIME.clone(), value);
    }

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = elapsed.as_millis(),
        "request completed"
    );

    response
}

/// Bounds the whole request, upstream failover included.
pub async fn request_timeout_middleware(
    State(timeout): State<Duration>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    match tokio::time::timeout(timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(path = %path, timeout_secs = timeout.as_secs(), "request timed out");
            ApiError::new(
                StatusCode::GATEWAY_TIMEOUT,
                "REQUEST_TIMEOUT",
                format!("Request did not complete within {} seconds", timeout.as_secs()),
            )
            .into_response()
        }
    }
}
