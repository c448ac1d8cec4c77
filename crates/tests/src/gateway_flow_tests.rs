//! Full HTTP stack against mock nodes: rate limiting, caching and error rendering.

use crate::mock_infrastructure::{
    body_json, build_app, build_runtime, client_addr, get_request, header_str, post_request,
    rpc_request, test_config, RpcMockBuilder,
};
use axum::http::StatusCode;
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;

#[tokio::test]
async fn test_rate_limit_end_to_end() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_method_times("eth_blockNumber", &json!("0x10"), 1).await;

    let mut config = test_config(vec![node.url()]);
    config.rate_limit.per_minute = 2;
    let runtime = build_runtime(config);
    let app = build_app(&runtime);
    let client = client_addr(1);

    let first = app.clone().oneshot(get_request("/v1/chain/block-number", client)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header_str(&first, "x-ratelimit-remaining-minute").as_deref(), Some("1"));
    assert_eq!(header_str(&first, "x-ratelimit-limit-minute").as_deref(), Some("2"));
    assert_eq!(header_str(&first, "x-cache-status").as_deref(), Some("MISS"));

    let second = app.clone().oneshot(get_request("/v1/chain/block-number", client)).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header_str(&second, "x-ratelimit-remaining-minute").as_deref(), Some("0"));
    assert_eq!(header_str(&second, "x-cache-status").as_deref(), Some("HIT"));

    let third = app.clone().oneshot(get_request("/v1/chain/block-number", client)).await.unwrap();
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = header_str(&third, "retry-after").unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 60);

    let body = body_json(third).await;
    assert_eq!(body["error"], true);
    assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(body["details"]["retry_after"], retry_after);

    // Another client still has its own budget.
    let other = app.oneshot(get_request("/v1/chain/block-number", client_addr(2))).await.unwrap();
    assert_eq!(other.status(), StatusCode::OK);

    node.assert_expectations().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_health_routes_bypass_rate_limit() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_block_number(1).await;

    let mut config = test_config(vec![node.url()]);
    config.rate_limit.per_minute = 1;
    let runtime = build_runtime(config);
    let app = build_app(&runtime);
    let client = client_addr(3);

    for _ in 0..3 {
        let response = app.clone().oneshot(get_request("/health", client)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.oneshot(get_request("/v1/chain/block-number", client)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_short_ttl_expires() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_method_times("eth_gasPrice", &json!("0x1"), 2).await;

    let mut config = test_config(vec![node.url()]);
    config.cache.short_ttl_seconds = 1;
    let runtime = build_runtime(config);
    let app = build_app(&runtime);
    let client = client_addr(4);

    let first = app.clone().oneshot(get_request("/v1/chain/gas-price", client)).await.unwrap();
    assert_eq!(header_str(&first, "x-cache-status").as_deref(), Some("MISS"));

    let cached = app.clone().oneshot(get_request("/v1/chain/gas-price", client)).await.unwrap();
    assert_eq!(header_str(&cached, "x-cache-status").as_deref(), Some("HIT"));

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let refreshed = app.oneshot(get_request("/v1/chain/gas-price", client)).await.unwrap();
    assert_eq!(header_str(&refreshed, "x-cache-status").as_deref(), Some("MISS"));

    node.assert_expectations().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_all_endpoints_down_renders_503() {
    let mut a = RpcMockBuilder::new().await;
    let mut b = RpcMockBuilder::new().await;
    a.mock_server_error().await;
    b.mock_timeout("eth_chainId").await;

    let runtime = build_runtime(test_config(vec![a.url(), b.url()]));
    let app = build_app(&runtime);

    let response = app.clone().oneshot(get_request("/v1/chain/id", client_addr(5))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(header_str(&response, "x-ratelimit-remaining-minute").is_some());

    let body = body_json(response).await;
    assert_eq!(body["code"], "UPSTREAM_UNAVAILABLE");
    let attempts = body["details"]["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0]["url"], a.url());
    assert_eq!(attempts[1]["url"], b.url());

    // Failures are not cached: the next request goes upstream again.
    let response = app.oneshot(get_request("/v1/chain/id", client_addr(5))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_balance_served_from_fallback_and_cached() {
    let mut a = RpcMockBuilder::new().await;
    let mut b = RpcMockBuilder::new().await;
    a.mock_server_error().await;
    b.mock_method_times("eth_getBalance", &json!("0xde0b6b3a7640000"), 1).await;

    let runtime = build_runtime(test_config(vec![a.url(), b.url()]));
    let app = build_app(&runtime);
    let uri = "/v1/balances/0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";

    let response = app.clone().oneshot(get_request(uri, client_addr(6))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["balance_wei"], "0xde0b6b3a7640000");

    // Same address in different case hits the same entry.
    let lower = uri.to_ascii_lowercase();
    let response = app.oneshot(get_request(&lower, client_addr(6))).await.unwrap();
    assert_eq!(header_str(&response, "x-cache-status").as_deref(), Some("HIT"));

    b.assert_expectations().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_rpc_passthrough_end_to_end() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_method_times("eth_getTransactionCount", &json!("0x5"), 1).await;
    node.mock_rpc_error("eth_call", -32000, "execution reverted").await;

    let runtime = build_runtime(test_config(vec![node.url()]));
    let app = build_app(&runtime);
    let client = client_addr(7);

    let request = json!({
        "jsonrpc": "2.0",
        "method": "eth_getTransactionCount",
        "params": ["0xd8da6bf26964af9d7eed9e03e53415d37aa96045", "latest"],
        "id": 42
    });
    for expected in ["MISS", "HIT"] {
        let response = app.clone().oneshot(rpc_request(&request, client)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-cache-status").as_deref(), Some(expected));
        let body = body_json(response).await;
        assert_eq!(body["result"], "0x5");
        assert_eq!(body["id"], 42);
    }

    let call = json!({
        "jsonrpc": "2.0",
        "method": "eth_call",
        "params": [{ "to": "0xd8da6bf26964af9d7eed9e03e53415d37aa96045", "data": "0x" }, "latest"],
        "id": 43
    });
    let response = app.oneshot(rpc_request(&call, client)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "RPC_ERROR");
    assert_eq!(body["message"], "execution reverted");

    node.assert_expectations().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_broadcast_then_confirm_end_to_end() {
    let hash = format!("0x{}", "5a".repeat(32));
    let mut a = RpcMockBuilder::new().await;
    let mut b = RpcMockBuilder::new().await;
    a.mock_server_error().await;
    b.mock_method_times("eth_sendRawTransaction", &json!(hash), 2).await;
    b.mock_method(
        "eth_getTransactionReceipt",
        &json!({ "status": "0x1", "blockNumber": "0x10", "gasUsed": "0x5208" }),
    )
    .await;
    b.mock_block_number(0x12).await;

    let runtime = build_runtime(test_config(vec![a.url(), b.url()]));
    let app = build_app(&runtime);
    let client = client_addr(8);
    let request = json!({ "rawTransaction": "0x02f86c0180" });

    // Each broadcast goes upstream; a failing primary is skipped.
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_request("/v1/transactions/broadcast", &request, client))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["transaction_hash"], hash);
        assert_eq!(body["status"], "pending");
    }

    let uri = format!("/v1/transactions/{hash}/status");
    let response = app.clone().oneshot(get_request(&uri, client)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["block_number"], 16);
    assert_eq!(body["confirmations"], 2);
    assert_eq!(body["gas_used"], 21_000);

    let metrics = body_json(app.oneshot(get_request("/v1/metrics", client)).await.unwrap()).await;
    assert_eq!(metrics["transactions"]["total_tracked"], 1);
    assert_eq!(metrics["transactions"]["status_counts"]["confirmed"], 1);

    b.assert_expectations().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_rejected_broadcast_is_not_tracked() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_rpc_error("eth_sendRawTransaction", -32000, "nonce too low").await;

    let runtime = build_runtime(test_config(vec![node.url()]));
    let app = build_app(&runtime);

    let request = json!({ "rawTransaction": "0x02f86c0180" });
    let response = app
        .oneshot(post_request("/v1/transactions/broadcast", &request, client_addr(9)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "RPC_ERROR");
    assert_eq!(body["message"], "nonce too low");
    assert!(runtime.tracker().is_empty());

    runtime.shutdown().await;
}
