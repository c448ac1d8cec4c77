//! Fixtures for driving the gateway against mock nodes.

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::Request,
    response::Response,
    Router,
};
use fxgate_core::{config::AppConfig, runtime::FxgateRuntime};
use serde_json::Value;
use server::router::{create_app, AppState};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default configuration pointed at `rpc_urls` with a short per-attempt timeout.
#[must_use]
pub fn test_config(rpc_urls: Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();
    config.upstreams.rpc_urls = rpc_urls;
    config.upstreams.timeout_seconds = 2;
    config
}

/// Builds a runtime without background tasks.
///
/// # Panics
///
/// Panics if the configuration is rejected.
#[must_use]
pub fn build_runtime(config: AppConfig) -> FxgateRuntime {
    FxgateRuntime::builder()
        .with_config(config)
        .disable_background_tasks()
        .build()
        .expect("runtime should build")
}

#[must_use]
pub fn build_app(runtime: &FxgateRuntime) -> Router {
    create_app(AppState::from_runtime(runtime))
}

#[must_use]
pub fn client_addr(last_octet: u8) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)), 50_000)
}

/// # Panics
///
/// Panics if the request cannot be built.
#[must_use]
pub fn get_request(uri: &str, client: SocketAddr) -> Request<Body> {
    Request::builder().uri(uri).extension(ConnectInfo(client)).body(Body::empty()).expect("valid request")
}

/// # Panics
///
/// Panics if the request cannot be built.
#[must_use]
pub fn rpc_request(body: &Value, client: SocketAddr) -> Request<Body> {
    post_request("/v1/rpc", body, client)
}

/// JSON `POST` to `uri` from `client`.
///
/// # Panics
///
/// Panics if the request cannot be built.
#[must_use]
pub fn post_request(uri: &str, body: &Value, client: SocketAddr) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .extension(ConnectInfo(client))
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

/// # Panics
///
/// Panics if the body is not JSON.
pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("readable body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

#[must_use]
pub fn header_str(response: &Response, name: &str) -> Option<String> {
    response.headers().get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}
