//! In-memory response cache with per-entry TTL.
//!
//! Handlers memoize upstream results here to avoid repeating identical JSON-RPC reads.
//! Entries carry an absolute expiry; a lookup at or past that instant behaves exactly
//! like a miss and removes the stale entry. A background sweep (see [`background`])
//! removes expired entries nobody asks for again.
//!
//! # TTL Classes
//!
//! Callers pick one of two classes through [`TtlClass`]:
//!
//! - **Short** (default 30s): volatile reads such as balances, block number, gas price
//! - **Long** (default 5min): slow-changing reads such as the chain id
//!
//! # Failure Model
//!
//! The cache is never a source of truth. Nothing in this module returns an error to the
//! request path: a disabled cache answers every lookup with a miss and ignores stores,
//! and fetch errors passed through [`ResponseCache::get_or_fetch`] are returned to the
//! caller without being cached.
//!
//! # Concurrency
//!
//! Entries live in a sharded [`DashMap`]. Each value is an `Arc<Value>` replaced whole on
//! `set`, so a concurrent reader observes either the previous or the new value.

pub mod background;

use crate::{config::CacheConfig, types::CacheStatus};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Expiry class requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    Short,
    Long,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<Value>,
    expires_at: Instant,
}

impl CacheEntry {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    /// Live (unexpired) entries.
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Hit percentage rounded to two decimals; `0.0` before the first lookup.
    pub hit_rate: f64,
    pub total_requests: u64,
}

/// TTL-keyed store for serialized JSON-RPC results.
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    enabled: bool,
    short_ttl: Duration,
    long_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            enabled: config.enabled,
            short_ttl: Duration::from_secs(config.short_ttl_seconds),
            long_ttl: Duration::from_secs(config.long_ttl_seconds),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates an enabled cache with explicit TTL classes.
    #[must_use]
    pub fn with_ttls(short_ttl: Duration, long_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            enabled: true,
            short_ttl,
            long_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Resolves a TTL class to its configured duration.
    #[must_use]
    pub fn ttl_for(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Short => self.short_ttl,
            TtlClass::Long => self.long_ttl,
        }
    }

    /// Returns the value stored under `key` if it exists and has not expired.
    ///
    /// An expired entry is removed on the way out and counted as a miss.
    pub fn get(&self, key: &str) -> Option<Arc<Value>> {
        if !self.enabled {
            return None;
        }

        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .and_then(|entry| (!entry.is_expired(now)).then(|| Arc::clone(&entry.value)));

        if live.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "cache hit");
        } else {
            // Only drop the entry if it is still the expired one; a concurrent set wins.
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "cache miss");
        }

        live
    }

    /// Stores `value` under `key`, expiring `ttl` from now.
    ///
    /// Overwrites any existing entry and its expiry. A zero `ttl` stores nothing.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        if !self.enabled || ttl.is_zero() {
            return;
        }

        let entry = CacheEntry { value: Arc::new(value), expires_at: Instant::now() + ttl };
        self.entries.insert(key.into(), entry);
    }

    /// Stores `value` using the duration of a TTL class.
    pub fn set_class(&self, key: impl Into<String>, value: Value, class: TtlClass) {
        self.set(key, value, self.ttl_for(class));
    }

    /// Removes `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every entry and resets the hit/miss counters.
    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Removes all expired entries and returns how many were dropped.
    ///
    /// `retain` visits one shard at a time, so request tasks are only blocked on the
    /// shard currently being swept.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let expired = entry.is_expired(now);
            removed += usize::from(expired);
            !expired
        });

        if removed > 0 {
            debug!(removed = removed, remaining = self.entries.len(), "swept expired cache entries");
        }
        removed
    }

    /// Returns the current counters. `size` counts only unexpired entries.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let size = self.entries.iter().filter(|entry| !entry.is_expired(now)).count();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;

        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total_requests == 0 {
            0.0
        } else {
            (hits as f64 / total_requests as f64 * 10_000.0).round() / 100.0
        };

        CacheStats { size, hits, misses, hit_rate, total_requests }
    }

    /// Returns the cached value for `key`, or runs `fetch` and stores its result.
    ///
    /// Errors from `fetch` are returned untouched and never cached. A `null` result is
    /// returned but not stored, since it usually means "not available yet" (a pending
    /// receipt, a future block).
    ///
    /// # Errors
    ///
    /// Returns whatever error `fetch` produced.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<(Arc<Value>, CacheStatus), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(value) = self.get(key) {
            debug!(key = %key, "serving cached response");
            return Ok((value, CacheStatus::Hit));
        }

        let value = fetch().await?;
        if value.is_null() {
            return Ok((Arc::new(value), CacheStatus::Miss));
        }

        let value = Arc::new(value);
        if self.enabled && !ttl.is_zero() {
            self.entries.insert(
                key.to_string(),
                CacheEntry { value: Arc::clone(&value), expires_at: Instant::now() + ttl },
            );
        }
        Ok((value, CacheStatus::Miss))
    }
}

/// Builds the cache key for a method call: the method name, a colon, and the params
/// serialized as compact JSON.
///
/// Hex strings shaped like an address (20 bytes) or a hash (32 bytes) are lower-cased
/// so inputs that differ only in case share an entry. Everything else keeps its exact
/// JSON form, so `true` and `"true"` never collide.
///
/// ```
/// use fxgate_core::cache::cache_key;
/// use serde_json::json;
///
/// let address = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";
/// assert_eq!(
///     cache_key("eth_getBalance", &[json!(address), json!("latest")]),
///     r#"eth_getBalance:["0xd8da6bf26964af9d7eed9e03e53415d37aa96045","latest"]"#
/// );
/// ```
#[must_use]
pub fn cache_key(method: &str, params: &[Value]) -> String {
    let normalized: Vec<Value> = params.iter().map(normalize_param).collect();
    let rendered = serde_json::to_string(&normalized).unwrap_or_default();

    let mut key = String::with_capacity(method.len() + 1 + rendered.len());
    key.push_str(method);
    key.push(':');
    key.push_str(&rendered);
    key
}

fn normalize_param(param: &Value) -> Value {
    match param {
        Value::String(s) if is_address_or_hash(s) => Value::String(s.to_ascii_lowercase()),
        Value::Array(items) => Value::Array(items.iter().map(normalize_param).collect()),
        Value::Object(fields) => Value::Object(
            fields.iter().map(|(name, value)| (name.clone(), normalize_param(value))).collect(),
        ),
        other => other.clone(),
    }
}

fn is_address_or_hash(s: &str) -> bool {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).is_some_and(|hex| {
        matches!(hex.len(), 40 | 64) && hex.bytes().all(|b| b.is_ascii_hexdigit())
    })
}
