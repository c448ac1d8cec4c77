use anyhow::Result;
use axum::serve;
use fxgate_core::{config::AppConfig, runtime::FxgateRuntime};
use server::router::{create_app, AppState};
use std::{net::SocketAddr, time::Duration};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Graceful shutdown timeout in seconds.
/// Background tasks still running after this are abandoned.
const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

fn default_filter(level: &str) -> String {
    format!("warn,fxgate_core={level},server={level}")
}

fn init_logging(config: &AppConfig) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(env_filter) if env_filter == "debug" || env_filter == "trace" => {
            EnvFilter::new(default_filter(&env_filter))
        }
        Ok(_) => EnvFilter::try_from_env("RUST_LOG")
            .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.logging.level))),
        Err(_) => EnvFilter::new(default_filter(&config.logging.level)),
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(anyhow::anyhow!("Failed to read .env file: {e}"));
        }
    }

    let config = AppConfig::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;
    config.validate().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    init_logging(&config);
    info!(version = env!("CARGO_PKG_VERSION"), environment = %config.environment, "starting fxgate");
    debug!(
        endpoints_count = config.upstreams.rpc_urls.len(),
        rate_limit_enabled = config.rate_limit.enabled,
        cache_enabled = config.cache.enabled,
        bind_port = config.server.bind_port,
        "configuration loaded"
    );

    let addr = config.socket_addr().map_err(|e| anyhow::anyhow!(e))?;

    let runtime = FxgateRuntime::builder().with_config(config).enable_health_checker().build()?;
    let app = create_app(AppState::from_runtime(&runtime));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "fxgate listening");

    if let Err(e) = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error occurred");
    }

    if tokio::time::timeout(
        Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT_SECS),
        runtime.shutdown(),
    )
    .await
    .is_err()
    {
        warn!(timeout_secs = GRACEFUL_SHUTDOWN_TIMEOUT_SECS, "runtime shutdown timed out");
    }

    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!(
        "Shutdown signal received, starting graceful shutdown (timeout: {}s)",
        GRACEFUL_SHUTDOWN_TIMEOUT_SECS
    );
}
