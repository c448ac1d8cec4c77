use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use fxgate_core::{
    metrics::MetricsCollector,
    rate_limit::{Decision, RateLimiter, WindowKind},
};
use std::{net::SocketAddr, sync::Arc};

use crate::error::ApiError;

/// State shared by [`rate_limit_middleware`].
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub metrics: Option<Arc<MetricsCollector>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter, metrics: None }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

fn limit_header(kind: WindowKind) -> HeaderName {
    match kind {
        WindowKind::Minute => HeaderName::from_static("x-ratelimit-limit-minute"),
        WindowKind::Hour => HeaderName::from_static("x-ratelimit-limit-hour"),
        WindowKind::Day => HeaderName::from_static("x-ratelimit-limit-day"),
    }
}

fn remaining_header(kind: WindowKind) -> HeaderName {
    match kind {
        WindowKind::Minute => HeaderName::from_static("x-ratelimit-remaining-minute"),
        WindowKind::Hour => HeaderName::from_static("x-ratelimit-remaining-hour"),
        WindowKind::Day => HeaderName::from_static("x-ratelimit-remaining-day"),
    }
}

/// Writes the limit and remaining headers for every window.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    for kind in WindowKind::ALL {
        headers.insert(limit_header(kind), HeaderValue::from(decision.limits.get(kind)));
        headers.insert(remaining_header(kind), HeaderValue::from(decision.remaining.get(kind)));
    }
}

/// Per-IP admission control over the minute, hour and day windows.
///
/// Admitted requests get the rate-limit headers added to the downstream response.
/// Rejected requests never reach the handler: they get a 429 envelope with
/// `Retry-After` in whole seconds.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = addr.ip().to_string();
    let decision = state.limiter.admit(&client);

    if let Some(metrics) = &state.metrics {
        metrics.record_rate_limit(decision.allowed, decision.exhausted.map(WindowKind::as_str));
    }

    if !decision.allowed {
        let retry_after = decision.retry_after_secs().unwrap_or(1);
        tracing::warn!(
            client = %client,
            window = decision.exhausted.map_or("unknown", WindowKind::as_str),
            retry_after_secs = retry_after,
            "rate limit exceeded"
        );

        let mut response = ApiError::rate_limited(retry_after).into_response();
        let headers = response.headers_mut();
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
        apply_rate_limit_headers(headers, &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use fxgate_core::rate_limit::RateLimits;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use tower::ServiceExt;

    async fn test_handler() -> &'static str {
        "success"
    }

    fn app(limits: RateLimits) -> (Router, Arc<RateLimiter>) {
        let limiter = Arc::new(RateLimiter::new(limits));
        let state = RateLimitState::new(Arc::clone(&limiter));
        let router = Router::new()
            .route("/test", get(test_handler))
            .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
            .with_state(state);
        (router, limiter)
    }

    fn request_from(addr: SocketAddr) -> Request<Body> {
        Request::builder().uri("/test").extension(ConnectInfo(addr)).body(Body::empty()).unwrap()
    }

    fn header(response: &Response, name: &str) -> String {
        response.headers().get(name).unwrap().to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_admitted_response_carries_headers() {
        let (app, _) = app(RateLimits { per_minute: 5, per_hour: 50, per_day: 500 });
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);

        let response = app.oneshot(request_from(addr)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-limit-minute"), "5");
        assert_eq!(header(&response, "x-ratelimit-limit-hour"), "50");
        assert_eq!(header(&response, "x-ratelimit-limit-day"), "500");
        assert_eq!(header(&response, "x-ratelimit-remaining-minute"), "4");
        assert_eq!(header(&response, "x-ratelimit-remaining-hour"), "49");
        assert_eq!(header(&response, "x-ratelimit-remaining-day"), "499");
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }

    #[tokio::test]
    async fn test_blocks_request_when_over_limit() {
        let (app, _) = app(RateLimits { per_minute: 2, per_hour: 100, per_day: 1000 });
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);

        for expected_remaining in ["1", "0"] {
            let response = app.clone().oneshot(request_from(addr)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(header(&response, "x-ratelimit-remaining-minute"), expected_remaining);
        }

        let response = app.oneshot(request_from(addr)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let retry_after: u64 = header(&response, "retry-after").parse().unwrap();
        assert!(retry_after > 0 && retry_after <= 60);
        assert_eq!(header(&response, "x-ratelimit-remaining-minute"), "0");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["details"]["retry_after"], retry_after);
    }

    #[tokio::test]
    async fn test_uses_ip_as_rate_limit_key() {
        let (app, limiter) = app(RateLimits { per_minute: 1, per_hour: 10, per_day: 10 });
        let addr1 = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
        let addr2 = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 8080);

        let response = app.oneshot(request_from(addr1)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(limiter.peek(&addr1.ip().to_string()).is_some());
        assert!(limiter.peek(&addr2.ip().to_string()).is_none());
    }

    #[tokio::test]
    async fn test_different_ips_have_separate_limits() {
        let (app, _) = app(RateLimits { per_minute: 1, per_hour: 10, per_day: 10 });
        let addr1 = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
        let addr2 = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 8080);

        let response = app.clone().oneshot(request_from(addr1)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(request_from(addr1)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app.oneshot(request_from(addr2)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_same_ip_different_ports_share_limit() {
        let (app, _) = app(RateLimits { per_minute: 1, per_hour: 10, per_day: 10 });
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);

        let response = app.clone().oneshot(request_from(SocketAddr::new(ip, 8080))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(request_from(SocketAddr::new(ip, 9090))).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
