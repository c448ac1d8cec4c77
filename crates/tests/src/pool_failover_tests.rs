//! Failover behaviour of `RpcPool` over real HTTP against mock nodes.

use crate::mock_infrastructure::{test_config, RpcMockBuilder};
use fxgate_core::upstream::{RpcPool, UpstreamError};
use serde_json::json;

fn pool_over(urls: Vec<String>) -> RpcPool {
    RpcPool::from_config(&test_config(urls).upstreams).expect("pool should build")
}

fn health_flags(pool: &RpcPool) -> Vec<bool> {
    pool.health_snapshot().into_iter().map(|endpoint| endpoint.healthy).collect()
}

#[tokio::test]
async fn test_fails_over_to_third_endpoint() {
    let mut a = RpcMockBuilder::new().await;
    let mut b = RpcMockBuilder::new().await;
    let mut c = RpcMockBuilder::new().await;
    a.mock_server_error().await;
    b.mock_timeout("eth_blockNumber").await;
    c.mock_block_number(100).await;

    let pool = pool_over(vec![a.url(), b.url(), c.url()]);
    let result = pool.call("eth_blockNumber", vec![]).await.unwrap();

    assert_eq!(result, json!("0x64"));
    assert_eq!(health_flags(&pool), vec![false, false, true]);
}

#[tokio::test]
async fn test_total_failure_lists_attempts_in_priority_order() {
    let mut a = RpcMockBuilder::new().await;
    let mut b = RpcMockBuilder::new().await;
    a.mock_server_error().await;
    b.mock_timeout("eth_chainId").await;

    let pool = pool_over(vec![a.url(), b.url()]);
    let err = pool.call("eth_chainId", vec![]).await.unwrap_err();

    let UpstreamError::Unavailable { attempts } = err else {
        panic!("expected Unavailable, got {err:?}");
    };
    let urls: Vec<_> = attempts.iter().map(|attempt| attempt.url.clone()).collect();
    assert_eq!(urls, vec![a.url(), b.url()]);
    assert!(attempts[0].reason.contains("500"));
    assert!(attempts[1].reason.contains("504"));
    assert_eq!(health_flags(&pool), vec![false, false]);
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_over() {
    let mut b = RpcMockBuilder::new().await;
    b.mock_method("eth_gasPrice", &json!("0x3b9aca00")).await;

    // Port 1 is never listening.
    let pool = pool_over(vec!["http://127.0.0.1:1".to_string(), b.url()]);
    let result = pool.call("eth_gasPrice", vec![]).await.unwrap();

    assert_eq!(result, json!("0x3b9aca00"));
    assert_eq!(health_flags(&pool), vec![false, true]);
}

#[tokio::test]
async fn test_client_error_is_returned_without_failover() {
    let mut a = RpcMockBuilder::new().await;
    let mut b = RpcMockBuilder::new().await;
    a.mock_rpc_error("eth_getBalance", -32602, "invalid argument 0").await;
    b.expect_no_calls("eth_getBalance").await;

    let pool = pool_over(vec![a.url(), b.url()]);
    let err = pool.call("eth_getBalance", vec![json!("0xzz"), json!("latest")]).await.unwrap_err();

    assert!(matches!(err, UpstreamError::RpcError(-32602, _)));
    assert_eq!(health_flags(&pool), vec![true, true]);
    b.assert_expectations().await;
}

#[tokio::test]
async fn test_node_rate_limit_fails_over() {
    let mut a = RpcMockBuilder::new().await;
    let mut b = RpcMockBuilder::new().await;
    a.mock_rpc_error("eth_blockNumber", -32005, "limit exceeded").await;
    b.mock_block_number(7).await;

    let pool = pool_over(vec![a.url(), b.url()]);
    let result = pool.call("eth_blockNumber", vec![]).await.unwrap();

    assert_eq!(result, json!("0x7"));
    assert_eq!(health_flags(&pool), vec![false, true]);
}

#[tokio::test]
async fn test_recovered_primary_is_preferred_again() {
    let mut a = RpcMockBuilder::new().await;
    let mut b = RpcMockBuilder::new().await;
    a.mock_server_error().await;
    b.mock_block_number(1).await;

    let pool = pool_over(vec![a.url(), b.url()]);
    assert_eq!(pool.call("eth_blockNumber", vec![]).await.unwrap(), json!("0x1"));
    assert_eq!(health_flags(&pool), vec![false, true]);

    a.reset().await;
    a.mock_block_number(2).await;

    // Unhealthy endpoints keep their place in the order.
    assert_eq!(pool.call("eth_blockNumber", vec![]).await.unwrap(), json!("0x2"));
    assert_eq!(health_flags(&pool), vec![true, true]);
}

#[tokio::test]
async fn test_probe_all_reports_each_endpoint() {
    let mut a = RpcMockBuilder::new().await;
    let mut b = RpcMockBuilder::new().await;
    a.mock_block_number(18_000_000).await;
    b.mock_server_error().await;

    let pool = pool_over(vec![a.url(), b.url()]);
    let results = pool.probe_all().await;

    assert_eq!(results.len(), 2);
    assert!(results[0].healthy);
    assert_eq!(results[0].block_number, Some(18_000_000));
    assert!(!results[1].healthy);
    assert!(results[1].error.is_some());
    assert_eq!(pool.healthy_count(), 1);
}
