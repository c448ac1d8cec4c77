use clap::Subcommand;
use fxgate_core::upstream::{ProbeResult, RpcPool};

use super::{
    config::load_config,
    utils::{mask_url, print_info, print_success, CliError, CliResult},
};

#[derive(Subcommand)]
pub enum EndpointsCommands {
    /// Probe every configured RPC endpoint with eth_blockNumber
    Check {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Per-endpoint timeout in seconds (defaults to upstreams.timeout_seconds)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Print RPC URLs in full instead of masking their paths
        #[arg(long)]
        show_sensitive: bool,
    },
}

pub async fn handle_endpoints_command(command: EndpointsCommands) -> CliResult<()> {
    match command {
        EndpointsCommands::Check { file, timeout, json, show_sensitive } => {
            check_endpoints(&file, timeout, json, show_sensitive).await
        }
    }
}

async fn check_endpoints(
    file: &str,
    timeout: Option<u64>,
    as_json: bool,
    show_sensitive: bool,
) -> CliResult<()> {
    let mut config = load_config(file)?;
    if let Some(timeout) = timeout {
        config.upstreams.timeout_seconds = timeout;
    }

    let pool = RpcPool::from_config(&config.upstreams).map_err(|e| CliError::Config(e.to_string()))?;

    if !as_json {
        print_info(&format!(
            "Probing {} endpoints (timeout {}s)...",
            pool.endpoints().len(),
            config.upstreams.timeout_seconds
        ));
    }

    let mut results = pool.probe_all().await;
    if !show_sensitive {
        for result in &mut results {
            result.url = mask_url(&result.url);
        }
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for (priority, result) in results.iter().enumerate() {
            println!("{}", format_probe(priority, result));
        }
    }

    let reachable = results.iter().filter(|result| result.healthy).count();
    match reachable {
        0 => Err(CliError::Network("no RPC endpoint is reachable".to_string())),
        n if n == results.len() => {
            print_success(&format!("All {n} endpoints reachable"));
            Ok(())
        }
        n => {
            print_info(&format!("{n} of {} endpoints reachable", results.len()));
            Ok(())
        }
    }
}

fn format_probe(priority: usize, result: &ProbeResult) -> String {
    if result.healthy {
        format!(
            "  {priority}. [OK]   {} block={} latency={}ms",
            result.url,
            result.block_number.map_or_else(|| "?".to_string(), |block| block.to_string()),
            result.latency_ms.unwrap_or_default()
        )
    } else {
        format!(
            "  {priority}. [FAIL] {} {}",
            result.url,
            result.error.as_deref().unwrap_or("unreachable")
        )
    }
}
