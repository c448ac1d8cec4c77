//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations and serde field defaults
//! 2. **Config file**: TOML file named by the `FXGATE_CONFIG` env var
//! 3. **Nested environment variables**: `FXGATE__SECTION__KEY`
//! 4. **Flat deployment variables**: `RPC_URLS`, `RPC_TIMEOUT`, `RATE_LIMIT_PER_MINUTE`, ...
//!
//! The flat names are the ones existing deployments already export, so they win over
//! everything else.
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP bind address, concurrency and CORS origins
//! - [`UpstreamsConfig`]: ordered RPC URL list, per-attempt timeout, failure cooldown
//! - [`CacheConfig`]: short/long TTL classes and sweep interval
//! - [`RateLimitConfig`]: minute/hour/day limits and client table bound
//! - [`HealthCheckConfig`]: active endpoint probing interval
//! - [`TransactionsConfig`]: retention of broadcast transactions being tracked
//! - [`MetricsConfig`], [`LoggingConfig`]
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_port = 8000
//!
//! [upstreams]
//! rpc_urls = ["https://eth.llamarpc.com", "https://rpc.ankr.com/eth"]
//! timeout_seconds = 10
//!
//! [rate_limit]
//! per_minute = 100
//! ```

use crate::rate_limit::RateLimits;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Deserializer, Serialize};
use std::{path::Path, str::FromStr, time::Duration};

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `0.0.0.0`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port number to listen on. Defaults to `8000`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Maximum number of requests processed concurrently. Defaults to `100`.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Whole-request timeout in seconds. Defaults to `45`.
    ///
    /// Must exceed `upstreams.timeout_seconds` times the number of endpoints so a
    /// request can wait out every attempt of a full failover walk.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// CORS origins. `["*"]` allows any origin.
    #[serde(default = "default_allowed_origins", deserialize_with = "deserialize_list")]
    pub allowed_origins: Vec<String>,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_bind_port() -> u16 {
    8000
}

fn default_max_concurrent_requests() -> usize {
    100
}

fn default_request_timeout_seconds() -> u64 {
    45
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// Upstream JSON-RPC endpoint settings.
///
/// Endpoints are attempted in list order; the first URL is the preferred one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamsConfig {
    /// Ordered endpoint URLs. Accepts a TOML array or a comma-separated string.
    #[serde(default = "default_rpc_urls", deserialize_with = "deserialize_list")]
    pub rpc_urls: Vec<String>,

    /// Per-attempt timeout in seconds. Defaults to `10`.
    #[serde(default = "default_upstream_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Seconds a failed endpoint is moved to the back of the attempt order.
    /// `0` disables the cooldown.
    #[serde(default)]
    pub cooldown_seconds: u64,
}

fn default_rpc_urls() -> Vec<String> {
    vec![
        "https://eth.llamarpc.com".to_string(),
        "https://rpc.ankr.com/eth".to_string(),
        "https://ethereum.publicnode.com".to_string(),
    ]
}

fn default_upstream_timeout_seconds() -> u64 {
    10
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether caching is enabled. Defaults to `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TTL for volatile reads (balances, block number). Defaults to `30`.
    #[serde(default = "default_short_ttl_seconds")]
    pub short_ttl_seconds: u64,

    /// TTL for slow-changing reads (chain id). Defaults to `300`.
    #[serde(default = "default_long_ttl_seconds")]
    pub long_ttl_seconds: u64,

    /// Interval between background sweeps of expired entries. Defaults to `60`.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_short_ttl_seconds() -> u64 {
    30
}

fn default_long_ttl_seconds() -> u64 {
    300
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

/// Per-client rate limiting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether admission control runs at all. Defaults to `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_per_minute")]
    pub per_minute: u32,

    #[serde(default = "default_per_hour")]
    pub per_hour: u32,

    #[serde(default = "default_per_day")]
    pub per_day: u32,

    /// Upper bound on tracked clients. Defaults to `100000`.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Interval between idle-client evictions. Defaults to `300`.
    #[serde(default = "default_eviction_interval_seconds")]
    pub eviction_interval_seconds: u64,
}

fn default_per_minute() -> u32 {
    100
}

fn default_per_hour() -> u32 {
    5000
}

fn default_per_day() -> u32 {
    50000
}

fn default_max_clients() -> usize {
    100_000
}

fn default_eviction_interval_seconds() -> u64 {
    300
}

/// Active endpoint probing.
///
/// Probes send `eth_blockNumber` to every endpoint and refresh the advisory health flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Interval between probes in seconds. `0` disables the background checker.
    #[serde(default = "default_health_check_interval_seconds")]
    pub interval_seconds: u64,
}

fn default_health_check_interval_seconds() -> u64 {
    60
}

/// Tracking of transactions broadcast through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionsConfig {
    /// How long a tracked transaction is kept, in seconds. Defaults to `86400`.
    #[serde(default = "default_tx_max_age_seconds")]
    pub max_age_seconds: u64,

    /// Upper bound on tracked transactions. Defaults to `100000`.
    #[serde(default = "default_max_tracked")]
    pub max_tracked: usize,

    /// Interval between cleanups of aged-out entries. Defaults to `300`.
    #[serde(default = "default_tx_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

fn default_tx_max_age_seconds() -> u64 {
    24 * 60 * 60
}

fn default_max_tracked() -> usize {
    100_000
}

fn default_tx_cleanup_interval_seconds() -> u64 {
    300
}

/// Prometheus metrics exposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether `/metrics` is served. Defaults to `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset. Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Root application configuration containing all subsystem settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment environment (e.g., "development", "production"). Defaults to `"development"`.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Public API version segment reported by health routes. Defaults to `"v1"`.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstreams: UpstreamsConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub transactions: TransactionsConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_seconds: default_request_timeout_seconds(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for UpstreamsConfig {
    fn default() -> Self {
        Self {
            rpc_urls: default_rpc_urls(),
            timeout_seconds: default_upstream_timeout_seconds(),
            cooldown_seconds: 0,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            short_ttl_seconds: default_short_ttl_seconds(),
            long_ttl_seconds: default_long_ttl_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
            per_day: default_per_day(),
            max_clients: default_max_clients(),
            eviction_interval_seconds: default_eviction_interval_seconds(),
        }
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self { interval_seconds: default_health_check_interval_seconds() }
    }
}

impl Default for TransactionsConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: default_tx_max_age_seconds(),
            max_tracked: default_max_tracked(),
            cleanup_interval_seconds: default_tx_cleanup_interval_seconds(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            api_version: default_api_version(),
            server: ServerConfig::default(),
            upstreams: UpstreamsConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            health_check: HealthCheckConfig::default(),
            transactions: TransactionsConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Accepts either a sequence of strings or one comma-separated string.
fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match ListOrString::deserialize(deserializer)? {
        ListOrString::List(items) => {
            items.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
        }
        ListOrString::Csv(raw) => split_list(&raw),
    })
}

/// Splits a comma-separated list, trimming whitespace and dropping empty items.
#[must_use]
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Message(format!("{name}: invalid value {raw:?}")))
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `FXGATE__` prefix can override any configuration value,
    /// using `__` as a separator for nested fields (e.g., `FXGATE__SERVER__BIND_PORT=8080`).
    /// The flat deployment variables listed in [`AppConfig::apply_env_overrides`] are applied
    /// last.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or a value has the wrong type.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("environment", "development")?
            .set_default("api_version", "v1")?
            .set_default("server.bind_address", "0.0.0.0")?
            .set_default("server.bind_port", 8000)?
            .set_default("server.max_concurrent_requests", 100)?
            .set_default("server.request_timeout_seconds", 45)?
            .set_default("upstreams.timeout_seconds", 10)?
            .set_default("upstreams.cooldown_seconds", 0)?
            .set_default("cache.enabled", true)?
            .set_default("cache.short_ttl_seconds", 30)?
            .set_default("cache.long_ttl_seconds", 300)?
            .set_default("cache.sweep_interval_seconds", 60)?
            .set_default("rate_limit.enabled", true)?
            .set_default("rate_limit.per_minute", 100)?
            .set_default("rate_limit.per_hour", 5000)?
            .set_default("rate_limit.per_day", 50000)?
            .set_default("health_check.interval_seconds", 60)?
            .set_default("transactions.max_age_seconds", 86_400)?
            .set_default("transactions.max_tracked", 100_000)?
            .set_default("transactions.cleanup_interval_seconds", 300)?
            .set_default("metrics.enabled", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("FXGATE").separator("__"))
            .build()?;

        let mut config: Self = config_builder.try_deserialize()?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The config file path can be overridden using the `FXGATE_CONFIG` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("FXGATE_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Applies the flat deployment variables through `lookup`.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `RPC_URLS` | `upstreams.rpc_urls` (comma-separated) |
    /// | `RPC_TIMEOUT` | `upstreams.timeout_seconds` |
    /// | `RPC_COOLDOWN` | `upstreams.cooldown_seconds` |
    /// | `RATE_LIMIT_PER_MINUTE` / `_HOUR` / `_DAY` | `rate_limit.per_*` |
    /// | `CACHE_TTL_SHORT` / `CACHE_TTL_LONG` | `cache.*_ttl_seconds` |
    /// | `API_HOST` / `API_PORT` | `server.bind_address` / `server.bind_port` |
    /// | `API_ENV` / `API_VERSION` | `environment` / `api_version` |
    /// | `ALLOWED_ORIGINS` | `server.allowed_origins` (comma-separated) |
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Message`] naming the variable when a numeric value does not
    /// parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("RPC_URLS") {
            let urls = split_list(&raw);
            if !urls.is_empty() {
                self.upstreams.rpc_urls = urls;
            }
        }
        if let Some(raw) = lookup("RPC_TIMEOUT") {
            self.upstreams.timeout_seconds = parse_var("RPC_TIMEOUT", &raw)?;
        }
        if let Some(raw) = lookup("RPC_COOLDOWN") {
            self.upstreams.cooldown_seconds = parse_var("RPC_COOLDOWN", &raw)?;
        }
        if let Some(raw) = lookup("RATE_LIMIT_PER_MINUTE") {
            self.rate_limit.per_minute = parse_var("RATE_LIMIT_PER_MINUTE", &raw)?;
        }
        if let Some(raw) = lookup("RATE_LIMIT_PER_HOUR") {
            self.rate_limit.per_hour = parse_var("RATE_LIMIT_PER_HOUR", &raw)?;
        }
        if let Some(raw) = lookup("RATE_LIMIT_PER_DAY") {
            self.rate_limit.per_day = parse_var("RATE_LIMIT_PER_DAY", &raw)?;
        }
        if let Some(raw) = lookup("CACHE_TTL_SHORT") {
            self.cache.short_ttl_seconds = parse_var("CACHE_TTL_SHORT", &raw)?;
        }
        if let Some(raw) = lookup("CACHE_TTL_LONG") {
            self.cache.long_ttl_seconds = parse_var("CACHE_TTL_LONG", &raw)?;
        }
        if let Some(raw) = lookup("API_HOST") {
            self.server.bind_address = raw.trim().to_string();
        }
        if let Some(raw) = lookup("API_PORT") {
            self.server.bind_port = parse_var("API_PORT", &raw)?;
        }
        if let Some(raw) = lookup("API_ENV") {
            self.environment = raw.trim().to_string();
        }
        if let Some(raw) = lookup("API_VERSION") {
            self.api_version = raw.trim().to_string();
        }
        if let Some(raw) = lookup("ALLOWED_ORIGINS") {
            self.server.allowed_origins = split_list(&raw);
        }
        Ok(())
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed into a valid [`SocketAddr`].
    ///
    /// [`SocketAddr`]: std::net::SocketAddr
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid socket address: {}:{}",
                    self.server.bind_address, self.server.bind_port
                )
            })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    /// Per-attempt upstream timeout.
    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstreams.timeout_seconds)
    }

    /// Failure cooldown, or `None` when disabled.
    #[must_use]
    pub fn upstream_cooldown(&self) -> Option<Duration> {
        (self.upstreams.cooldown_seconds > 0)
            .then(|| Duration::from_secs(self.upstreams.cooldown_seconds))
    }

    #[must_use]
    pub fn short_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.short_ttl_seconds)
    }

    #[must_use]
    pub fn long_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.long_ttl_seconds)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_seconds)
    }

    /// Health probe interval, or `None` when active probing is disabled.
    #[must_use]
    pub fn health_check_interval(&self) -> Option<Duration> {
        (self.health_check.interval_seconds > 0)
            .then(|| Duration::from_secs(self.health_check.interval_seconds))
    }

    #[must_use]
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit.eviction_interval_seconds)
    }

    #[must_use]
    pub fn tx_max_age(&self) -> Duration {
        Duration::from_secs(self.transactions.max_age_seconds)
    }

    #[must_use]
    pub fn tx_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.transactions.cleanup_interval_seconds)
    }

    /// Per-window limits for the rate limiter.
    #[must_use]
    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            per_minute: self.rate_limit.per_minute,
            per_hour: self.rate_limit.per_hour,
            per_day: self.rate_limit.per_day,
        }
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.upstreams.rpc_urls.is_empty() {
            return Err("No upstream RPC endpoints configured".to_string());
        }

        for raw in &self.upstreams.rpc_urls {
            let parsed =
                url::Url::parse(raw).map_err(|e| format!("Invalid RPC URL {raw}: {e}"))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!("RPC URL must use http or https: {raw}"));
            }
        }

        if self.upstreams.timeout_seconds == 0 {
            return Err("Upstream timeout must be greater than 0".to_string());
        }

        if self.server.request_timeout_seconds == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }

        let endpoint_count = u64::try_from(self.upstreams.rpc_urls.len()).unwrap_or(u64::MAX);
        let failover_budget = self.upstreams.timeout_seconds.saturating_mul(endpoint_count);
        if self.server.request_timeout_seconds <= failover_budget {
            return Err(format!(
                "Request timeout ({}s) must exceed the upstream timeout times the endpoint count ({}s)",
                self.server.request_timeout_seconds, failover_budget
            ));
        }

        if self.cache.short_ttl_seconds == 0 || self.cache.long_ttl_seconds == 0 {
            return Err("Cache TTLs must be greater than 0".to_string());
        }

        if self.cache.short_ttl_seconds > self.cache.long_ttl_seconds {
            return Err("Short cache TTL must not exceed the long cache TTL".to_string());
        }

        if self.cache.enabled && self.cache.sweep_interval_seconds == 0 {
            return Err("Cache sweep interval must be greater than 0".to_string());
        }

        if self.rate_limit.per_minute == 0 ||
            self.rate_limit.per_hour == 0 ||
            self.rate_limit.per_day == 0
        {
            return Err("Rate limits must be greater than 0".to_string());
        }

        if self.rate_limit.max_clients == 0 {
            return Err("Rate limit client capacity must be greater than 0".to_string());
        }

        if self.rate_limit.enabled && self.rate_limit.eviction_interval_seconds == 0 {
            return Err("Rate limit eviction interval must be greater than 0".to_string());
        }

        if self.transactions.max_age_seconds == 0 ||
            self.transactions.max_tracked == 0 ||
            self.transactions.cleanup_interval_seconds == 0
        {
            return Err("Transaction tracking settings must be greater than 0".to_string());
        }

        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }

        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }

    /// Renders the configuration as TOML, in the layout [`AppConfig::from_file`] reads.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Message`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Message(format!("failed to render config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.environment, "development");
        assert_eq!(config.api_version, "v1");
        assert_eq!(config.server.bind_port, 8000);
        assert_eq!(config.upstreams.rpc_urls.len(), 3);
        assert_eq!(config.upstreams.timeout_seconds, 10);
        assert_eq!(config.server.request_timeout_seconds, 45);
        assert_eq!(config.cache.short_ttl_seconds, 30);
        assert_eq!(config.cache.long_ttl_seconds, 300);
        assert_eq!(config.rate_limit.per_minute, 100);
        assert_eq!(config.rate_limit.per_hour, 5000);
        assert_eq!(config.rate_limit.per_day, 50000);
        assert!(config.upstream_cooldown().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();

        config.upstreams.rpc_urls.clear();
        assert!(config.validate().is_err());

        config.upstreams.rpc_urls = vec!["not a url".to_string()];
        assert!(config.validate().is_err());

        config.upstreams.rpc_urls = vec!["ws://node.example.com".to_string()];
        assert!(config.validate().is_err());

        config.upstreams.rpc_urls = vec!["https://node.example.com".to_string()];
        assert!(config.validate().is_ok());

        config.cache.short_ttl_seconds = 600;
        assert!(config.validate().is_err());
        config.cache.short_ttl_seconds = 30;

        config.rate_limit.per_hour = 0;
        assert!(config.validate().is_err());
        config.rate_limit.per_hour = 5000;

        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_timeout_covers_failover_walk() {
        let mut config = AppConfig::default();

        config.server.request_timeout_seconds = 0;
        assert!(config.validate().is_err());

        // Three endpoints at 10s each need more than 30s.
        config.server.request_timeout_seconds = 30;
        let err = config.validate().unwrap_err();
        assert!(err.contains("30s"));

        config.server.request_timeout_seconds = 31;
        assert!(config.validate().is_ok());

        config.upstreams.rpc_urls.truncate(1);
        config.server.request_timeout_seconds = 11;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rendered_toml_round_trips() {
        let mut config = AppConfig::default();
        config.upstreams.cooldown_seconds = 15;

        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("[rate_limit]"));

        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.upstreams.rpc_urls, config.upstreams.rpc_urls);
        assert_eq!(parsed.upstreams.cooldown_seconds, 15);
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[server]
bind_port = 8080

[upstreams]
rpc_urls = ["https://a.example.com", "https://b.example.com"]
timeout_seconds = 5

[cache]
short_ttl_seconds = 10
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.bind_port, 8080);
        assert_eq!(config.upstreams.rpc_urls, vec!["https://a.example.com", "https://b.example.com"]);
        assert_eq!(config.upstreams.timeout_seconds, 5);
        assert_eq!(config.cache.short_ttl_seconds, 10);
        assert_eq!(config.cache.long_ttl_seconds, 300);
        assert_eq!(config.rate_limit.per_day, 50000);
    }

    #[test]
    fn test_rpc_urls_accepts_comma_separated_string() {
        let toml_content = r#"
[upstreams]
rpc_urls = " https://a.example.com , https://b.example.com,,"
"#;
        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.upstreams.rpc_urls, vec!["https://a.example.com", "https://b.example.com"]);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("RPC_URLS", "https://one.example.com,https://two.example.com"),
            ("RPC_TIMEOUT", "7"),
            ("RATE_LIMIT_PER_MINUTE", "2"),
            ("RATE_LIMIT_PER_HOUR", "20"),
            ("RATE_LIMIT_PER_DAY", "200"),
            ("CACHE_TTL_SHORT", "15"),
            ("CACHE_TTL_LONG", "120"),
            ("API_PORT", "9000"),
            ("API_ENV", "production"),
            ("ALLOWED_ORIGINS", "https://app.example.com, https://admin.example.com"),
        ]);

        let mut config = AppConfig::default();
        config.apply_env_overrides(|name| vars.get(name).map(|v| (*v).to_string())).unwrap();

        assert_eq!(config.upstreams.rpc_urls, vec!["https://one.example.com", "https://two.example.com"]);
        assert_eq!(config.upstream_timeout(), Duration::from_secs(7));
        assert_eq!(config.rate_limits(), RateLimits { per_minute: 2, per_hour: 20, per_day: 200 });
        assert_eq!(config.short_ttl(), Duration::from_secs(15));
        assert_eq!(config.long_ttl(), Duration::from_secs(120));
        assert_eq!(config.server.bind_port, 9000);
        assert_eq!(config.environment, "production");
        assert_eq!(config.server.allowed_origins.len(), 2);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|name| (name == "RATE_LIMIT_PER_MINUTE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_PER_MINUTE"));
    }

    #[test]
    fn test_empty_rpc_urls_env_keeps_defaults() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|name| (name == "RPC_URLS").then(|| " , ".to_string())).unwrap();
        assert_eq!(config.upstreams.rpc_urls.len(), 3);
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file_uses_defaults_and_nested_env() {
        std::env::set_var("FXGATE__RATE_LIMIT__PER_MINUTE", "42");
        let config = AppConfig::from_file("does/not/exist.toml");
        std::env::remove_var("FXGATE__RATE_LIMIT__PER_MINUTE");

        let config = config.unwrap();
        assert_eq!(config.rate_limit.per_minute, 42);
        assert_eq!(config.rate_limit.per_hour, 5000);
        assert_eq!(config.server.bind_port, 8000);
        assert_eq!(config.upstreams.timeout_seconds, 10);
        assert_eq!(config.server.request_timeout_seconds, 45);
        assert_eq!(config.transactions.max_age_seconds, 86_400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_accessors() {
        let mut config = AppConfig::default();
        config.upstreams.cooldown_seconds = 10;
        config.health_check.interval_seconds = 0;

        assert_eq!(config.upstream_cooldown(), Some(Duration::from_secs(10)));
        assert!(config.health_check_interval().is_none());
        assert_eq!(config.tx_max_age(), Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.tx_cleanup_interval(), Duration::from_secs(300));
        assert_eq!(config.socket_addr().unwrap().port(), 8000);
    }
}
