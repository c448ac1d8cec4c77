use clap::Subcommand;
use fxgate_core::config::AppConfig;
use std::path::Path;

use super::utils::{mask_url, print_info, print_success, CliError, CliResult};

const GENERATED_HEADER: &str = "# fxgate configuration
#
# Every value below is the built-in default. Values can be overridden with
# FXGATE__SECTION__KEY environment variables (for example FXGATE__SERVER__BIND_PORT)
# or the flat deployment variables RPC_URLS, RPC_TIMEOUT, RATE_LIMIT_PER_MINUTE,
# RATE_LIMIT_PER_HOUR, RATE_LIMIT_PER_DAY, CACHE_TTL_SHORT, CACHE_TTL_LONG, API_PORT
# and API_ENV.

";

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the effective configuration (file plus environment)
    Validate {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Show the effective configuration
    Show {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Print RPC URLs in full instead of masking their paths
        #[arg(long)]
        show_sensitive: bool,

        /// Print the configuration as TOML
        #[arg(long)]
        toml: bool,
    },

    /// Generate a configuration file populated with defaults
    Generate {
        /// Output path for the config file
        #[arg(short, long, default_value = "config/config.toml")]
        output: String,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(&file).map(|_| ()),
        ConfigCommands::Show { file, show_sensitive, toml } => show_config(&file, show_sensitive, toml),
        ConfigCommands::Generate { output, force } => generate_config(&output, force),
    }
}

/// Loads `file` with environment overrides applied.
pub fn load_config(file: &str) -> CliResult<AppConfig> {
    if !Path::new(file).exists() {
        print_info(&format!("{file} not found, using defaults and environment"));
    }
    AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

fn validate_config(file: &str) -> CliResult<AppConfig> {
    print_info(&format!("Loading configuration from {file}..."));
    let config = load_config(file)?;

    print_info("Validating configuration...");
    config.validate().map_err(CliError::Config)?;

    print_success("Configuration is valid!");

    println!("Configuration Summary:");
    println!("  Server: {}:{}", config.server.bind_address, config.server.bind_port);
    println!("  RPC endpoints: {}", config.upstreams.rpc_urls.len());
    println!(
        "  Cache: {} (short {}s, long {}s)",
        enabled(config.cache.enabled),
        config.cache.short_ttl_seconds,
        config.cache.long_ttl_seconds
    );
    println!(
        "  Rate limit: {} ({}/min, {}/hour, {}/day)",
        enabled(config.rate_limit.enabled),
        config.rate_limit.per_minute,
        config.rate_limit.per_hour,
        config.rate_limit.per_day
    );
    println!("  Metrics: {}", enabled(config.metrics.enabled));

    Ok(config)
}

fn show_config(file: &str, show_sensitive: bool, as_toml: bool) -> CliResult<()> {
    let mut config = load_config(file)?;
    if !show_sensitive {
        config.upstreams.rpc_urls = config.upstreams.rpc_urls.iter().map(|url| mask_url(url)).collect();
    }

    if as_toml {
        let rendered = config.to_toml_string().map_err(|e| CliError::General(e.to_string()))?;
        print!("{rendered}");
        return Ok(());
    }

    println!("Configuration from {file} ({}):", config.environment);

    println!("\n[Server]");
    println!("  Bind Address: {}", config.server.bind_address);
    println!("  Bind Port: {}", config.server.bind_port);
    println!("  Max Concurrent Requests: {}", config.server.max_concurrent_requests);
    println!("  Request Timeout: {}s", config.server.request_timeout_seconds);
    println!("  Allowed Origins: {}", config.server.allowed_origins.join(", "));

    println!("\n[Upstreams] ({} endpoints, in priority order)", config.upstreams.rpc_urls.len());
    for (priority, url) in config.upstreams.rpc_urls.iter().enumerate() {
        println!("  {priority}: {url}");
    }
    println!("  Timeout: {}s", config.upstreams.timeout_seconds);
    if config.upstreams.cooldown_seconds > 0 {
        println!("  Cooldown: {}s", config.upstreams.cooldown_seconds);
    }
    if !show_sensitive {
        println!("  (paths hidden - use --show-sensitive to reveal)");
    }

    println!("\n[Cache]");
    println!("  Enabled: {}", config.cache.enabled);
    println!("  Short TTL: {}s", config.cache.short_ttl_seconds);
    println!("  Long TTL: {}s", config.cache.long_ttl_seconds);
    println!("  Sweep Interval: {}s", config.cache.sweep_interval_seconds);

    println!("\n[Rate Limit]");
    println!("  Enabled: {}", config.rate_limit.enabled);
    println!("  Per Minute: {}", config.rate_limit.per_minute);
    println!("  Per Hour: {}", config.rate_limit.per_hour);
    println!("  Per Day: {}", config.rate_limit.per_day);
    println!("  Max Tracked Clients: {}", config.rate_limit.max_clients);

    println!("\n[Health Check]");
    println!("  Interval: {}s", config.health_check.interval_seconds);

    println!("\n[Logging]");
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);

    Ok(())
}

fn render_default_config() -> CliResult<String> {
    let body = AppConfig::default().to_toml_string().map_err(|e| CliError::General(e.to_string()))?;
    Ok(format!("{GENERATED_HEADER}{body}"))
}

fn generate_config(output: &str, force: bool) -> CliResult<()> {
    let path = Path::new(output);
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "File {output} already exists. Use --force to overwrite."
        )));
    }

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_default_config()?)?;

    print_success(&format!("Configuration written to {output}"));
    Ok(())
}
