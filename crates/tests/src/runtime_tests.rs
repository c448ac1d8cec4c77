//! Runtime lifecycle against mock nodes: background tasks and shutdown.
//!
//! Every wait is bounded with `tokio::time::timeout` so a broken task fails the test
//! instead of hanging it.

use crate::mock_infrastructure::{test_config, RpcMockBuilder};
use fxgate_core::{
    config::AppConfig,
    runtime::{builder::RuntimeError, FxgateRuntime},
};
use serde_json::json;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::time::{sleep, timeout, Duration};

fn with_fast_health_checks(mut config: AppConfig) -> AppConfig {
    config.health_check.interval_seconds = 1;
    config
}

#[tokio::test]
async fn test_health_checker_marks_failing_endpoint_unhealthy() {
    let mut a = RpcMockBuilder::new().await;
    let mut b = RpcMockBuilder::new().await;
    a.mock_server_error().await;
    b.mock_block_number(5).await;

    let runtime = FxgateRuntime::builder()
        .with_config(with_fast_health_checks(test_config(vec![a.url(), b.url()])))
        .enable_health_checker()
        .disable_background_tasks()
        .build()
        .expect("runtime should build");
    assert!(runtime.components().has_health_checker());

    let pool = Arc::clone(runtime.pool());
    timeout(Duration::from_secs(5), async {
        loop {
            let flags: Vec<bool> = pool.health_snapshot().iter().map(|e| e.healthy).collect();
            if flags == [false, true] {
                break;
            }
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("health checker should mark the failing endpoint");

    timeout(Duration::from_secs(5), runtime.shutdown()).await.expect("shutdown should not hang");
}

#[tokio::test]
async fn test_health_checker_restores_recovered_endpoint() {
    let mut a = RpcMockBuilder::new().await;
    a.mock_server_error().await;

    let runtime = FxgateRuntime::builder()
        .with_config(with_fast_health_checks(test_config(vec![a.url()])))
        .enable_health_checker()
        .disable_background_tasks()
        .build()
        .expect("runtime should build");

    let pool = Arc::clone(runtime.pool());
    let wait_for = |healthy: bool| {
        let pool = Arc::clone(&pool);
        async move {
            timeout(Duration::from_secs(5), async {
                while pool.healthy_count() != usize::from(healthy) {
                    sleep(Duration::from_millis(50)).await;
                }
            })
            .await
        }
    };

    wait_for(false).await.expect("endpoint should be marked unhealthy");

    a.reset().await;
    a.mock_block_number(9).await;

    wait_for(true).await.expect("endpoint should recover on the next probe");

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_cache_sweeper_purges_expired_entries() {
    let node = RpcMockBuilder::new().await;
    let mut config = test_config(vec![node.url()]);
    config.cache.sweep_interval_seconds = 1;

    let runtime =
        FxgateRuntime::builder().with_config(config).build().expect("runtime should build");

    let cache = Arc::clone(runtime.cache());
    cache.set("short-lived", json!("0x1"), Duration::from_millis(100));
    cache.set("long-lived", json!("0x2"), Duration::from_secs(300));
    assert_eq!(cache.stats().size, 2);

    // Two sweeps have run by now, so nothing expired is left for a manual pass.
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(cache.sweep_expired(), 0);
    assert_eq!(cache.stats().size, 1);
    assert!(cache.get("long-lived").is_some());

    timeout(Duration::from_secs(5), runtime.shutdown()).await.expect("shutdown should not hang");
}

#[tokio::test]
async fn test_every_shutdown_receiver_is_notified() {
    let node = RpcMockBuilder::new().await;
    let runtime = FxgateRuntime::builder()
        .with_config(test_config(vec![node.url()]))
        .build()
        .expect("runtime should build");

    let notified = Arc::new(AtomicUsize::new(0));
    let mut tasks = Vec::new();
    for _ in 0..4 {
        let mut rx = runtime.shutdown_receiver();
        let notified = Arc::clone(&notified);
        tasks.push(tokio::spawn(async move {
            if rx.recv().await.is_ok() {
                notified.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }

    timeout(Duration::from_secs(5), runtime.shutdown()).await.expect("shutdown should not hang");

    for task in tasks {
        timeout(Duration::from_secs(1), task)
            .await
            .expect("receiver task should finish")
            .expect("receiver task should not panic");
    }
    assert_eq!(notified.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_builder_rejects_non_http_endpoint() {
    let config = test_config(vec!["ws://127.0.0.1:8546".to_string()]);

    let result = FxgateRuntime::builder().with_config(config).build();

    match result {
        Err(RuntimeError::ConfigValidation(message)) => assert!(message.contains("ws://")),
        Err(other) => panic!("expected ConfigValidation, got {other}"),
        Ok(_) => panic!("expected ConfigValidation, got a runtime"),
    }
}

#[tokio::test]
async fn test_builder_rejects_missing_endpoints() {
    let result = FxgateRuntime::builder().with_config(test_config(Vec::new())).build();
    assert!(matches!(result, Err(RuntimeError::NoUpstreams)));
}
