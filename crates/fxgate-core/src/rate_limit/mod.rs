//! Per-client fixed-window rate limiting over minute, hour and day windows.
//!
//! Every client carries three counters that live together in one map entry. An
//! admission check rolls any window whose length has elapsed, rejects if any window
//! is at its limit, and otherwise increments all three. Because the whole check runs
//! under the entry's shard lock, two concurrent requests from the same client cannot
//! both take the last slot.
//!
//! Windows are fixed, not sliding, and reset lazily: a window that elapsed while the
//! client was quiet is reset on that client's next [`RateLimiter::admit`] call.
//!
//! **Security**: the number of tracked clients is bounded by `max_clients` so spoofed
//! source addresses cannot grow the table without limit. A full table is swept for
//! idle clients on the request path at most once per [`INLINE_EVICTION_INTERVAL`];
//! the rest is left to the background task.

use crate::config::RateLimitConfig;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Minimum gap between idle sweeps triggered by new clients hitting a full table.
pub const INLINE_EVICTION_INTERVAL: Duration = Duration::from_secs(10);

const NEVER_SWEPT: u64 = u64::MAX;

/// One of the three counting windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Minute,
    Hour,
    Day,
}

impl WindowKind {
    /// Evaluation order.
    pub const ALL: [WindowKind; 3] = [WindowKind::Minute, WindowKind::Hour, WindowKind::Day];

    #[must_use]
    pub const fn length(self) -> Duration {
        match self {
            WindowKind::Minute => MINUTE,
            WindowKind::Hour => HOUR,
            WindowKind::Day => DAY,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            WindowKind::Minute => "minute",
            WindowKind::Hour => "hour",
            WindowKind::Day => "day",
        }
    }

    const fn index(self) -> usize {
        match self {
            WindowKind::Minute => 0,
            WindowKind::Hour => 1,
            WindowKind::Day => 2,
        }
    }
}

/// Configured request limits per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self { per_minute: 100, per_hour: 5000, per_day: 50000 }
    }
}

impl RateLimits {
    #[must_use]
    pub const fn limit(&self, kind: WindowKind) -> u32 {
        match kind {
            WindowKind::Minute => self.per_minute,
            WindowKind::Hour => self.per_hour,
            WindowKind::Day => self.per_day,
        }
    }
}

/// A figure for each window, used for both limits and remaining capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowCounts {
    pub minute: u32,
    pub hour: u32,
    pub day: u32,
}

impl WindowCounts {
    #[must_use]
    pub const fn get(&self, kind: WindowKind) -> u32 {
        match kind {
            WindowKind::Minute => self.minute,
            WindowKind::Hour => self.hour,
            WindowKind::Day => self.day,
        }
    }

    fn set(&mut self, kind: WindowKind, value: u32) {
        match kind {
            WindowKind::Minute => self.minute = value,
            WindowKind::Hour => self.hour = value,
            WindowKind::Day => self.day = value,
        }
    }
}

impl From<RateLimits> for WindowCounts {
    fn from(limits: RateLimits) -> Self {
        Self { minute: limits.per_minute, hour: limits.per_hour, day: limits.per_day }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Time until the blocking window resets. `None` when admitted.
    pub retry_after: Option<Duration>,
    /// The window that set `retry_after`. `None` when admitted or when the client table
    /// was full.
    pub exhausted: Option<WindowKind>,
    /// Capacity left in each window after this decision.
    pub remaining: WindowCounts,
    pub limits: WindowCounts,
}

impl Decision {
    /// `retry_after` rounded up to whole seconds, never below one.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after.map(|wait| {
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            secs.max(1)
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started_at: Instant,
}

impl Window {
    const fn new(now: Instant) -> Self {
        Self { count: 0, started_at: now }
    }

    fn is_elapsed(&self, now: Instant, length: Duration) -> bool {
        now.duration_since(self.started_at) >= length
    }

    fn roll(&mut self, now: Instant, length: Duration) {
        if self.is_elapsed(now, length) {
            self.count = 0;
            self.started_at = now;
        }
    }

    fn resets_in(&self, now: Instant, length: Duration) -> Duration {
        length.saturating_sub(now.duration_since(self.started_at))
    }
}

#[derive(Debug, Clone)]
struct ClientWindows {
    windows: [Window; 3],
    last_seen: Instant,
}

impl ClientWindows {
    const fn new(now: Instant) -> Self {
        Self { windows: [Window::new(now); 3], last_seen: now }
    }
}

fn evict_idle_clients(
    clients: &DashMap<String, ClientWindows>,
    idle_ttl: Duration,
    now: Instant,
) -> usize {
    let mut evicted = 0;
    clients.retain(|_, client| {
        let idle = now.duration_since(client.last_seen) >= idle_ttl;
        evicted += usize::from(idle);
        !idle
    });
    evicted
}

/// Multi-window fixed-window rate limiter keyed by client identity.
pub struct RateLimiter {
    clients: Arc<DashMap<String, ClientWindows>>,
    limits: RateLimits,
    max_clients: usize,
    idle_ttl: Duration,
    created_at: Instant,
    /// Milliseconds after `created_at` of the last sweep run from `admit`.
    last_inline_sweep_ms: AtomicU64,
}

impl RateLimiter {
    const DEFAULT_MAX_CLIENTS: usize = 100_000;

    #[must_use]
    pub fn new(limits: RateLimits) -> Self {
        Self::with_max_clients(limits, Self::DEFAULT_MAX_CLIENTS)
    }

    #[must_use]
    pub fn with_max_clients(limits: RateLimits, max_clients: usize) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            limits,
            max_clients,
            idle_ttl: DAY,
            created_at: Instant::now(),
            last_inline_sweep_ms: AtomicU64::new(NEVER_SWEPT),
        }
    }

    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::with_max_clients(
            RateLimits {
                per_minute: config.per_minute,
                per_hour: config.per_hour,
                per_day: config.per_day,
            },
            config.max_clients,
        )
    }

    #[must_use]
    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    /// Checks and, if admitted, consumes one request from every window of `client_id`.
    ///
    /// New clients are rejected while the table is at capacity and no idle client can be
    /// evicted; their `retry_after` is one minute. Idle clients are only looked for when
    /// no other sweep ran within [`INLINE_EVICTION_INTERVAL`].
    pub fn admit(&self, client_id: &str) -> Decision {
        let now = Instant::now();

        if let Some(mut client) = self.clients.get_mut(client_id) {
            return self.evaluate(&mut client, now);
        }

        if self.clients.len() >= self.max_clients {
            let evicted = self.throttled_evict_idle(now);
            if self.clients.len() >= self.max_clients {
                warn!(
                    client = %client_id,
                    tracked = self.clients.len(),
                    evicted = evicted,
                    "rate limiter at capacity, rejecting new client"
                );
                return Decision {
                    allowed: false,
                    retry_after: Some(MINUTE),
                    exhausted: None,
                    remaining: WindowCounts::default(),
                    limits: self.limits.into(),
                };
            }
        }

        let mut client =
            self.clients.entry(client_id.to_string()).or_insert_with(|| ClientWindows::new(now));
        self.evaluate(&mut client, now)
    }

    fn evaluate(&self, client: &mut ClientWindows, now: Instant) -> Decision {
        client.last_seen = now;

        let mut blocking: Option<(WindowKind, Duration)> = None;
        for kind in WindowKind::ALL {
            let window = &mut client.windows[kind.index()];
            window.roll(now, kind.length());

            if window.count >= self.limits.limit(kind) {
                let wait = window.resets_in(now, kind.length());
                if blocking.map_or(true, |(_, current)| wait > current) {
                    blocking = Some((kind, wait));
                }
            }
        }

        let allowed = blocking.is_none();
        if allowed {
            for window in &mut client.windows {
                window.count = window.count.saturating_add(1);
            }
        }

        let mut remaining = WindowCounts::default();
        for kind in WindowKind::ALL {
            let used = client.windows[kind.index()].count;
            remaining.set(kind, self.limits.limit(kind).saturating_sub(used));
        }

        if !allowed {
            debug!(
                remaining_minute = remaining.minute,
                remaining_hour = remaining.hour,
                remaining_day = remaining.day,
                "rate limit window exhausted"
            );
        }

        Decision {
            allowed,
            retry_after: blocking.map(|(_, wait)| wait),
            exhausted: blocking.map(|(kind, _)| kind),
            remaining,
            limits: self.limits.into(),
        }
    }

    /// Remaining capacity for `client_id` without consuming anything.
    ///
    /// Returns `None` for clients that have never been seen or were evicted.
    #[must_use]
    pub fn peek(&self, client_id: &str) -> Option<WindowCounts> {
        let now = Instant::now();
        self.clients.get(client_id).map(|client| {
            let mut remaining = WindowCounts::default();
            for kind in WindowKind::ALL {
                let window = &client.windows[kind.index()];
                let used = if window.is_elapsed(now, kind.length()) { 0 } else { window.count };
                remaining.set(kind, self.limits.limit(kind).saturating_sub(used));
            }
            remaining
        })
    }

    /// Drops clients idle for longer than a day. Returns how many were removed.
    #[must_use = "the eviction count is useful for logging"]
    pub fn evict_idle(&self) -> usize {
        evict_idle_clients(&self.clients, self.idle_ttl, Instant::now())
    }

    /// Runs [`RateLimiter::evict_idle`] unless a request-path sweep already ran within
    /// [`INLINE_EVICTION_INTERVAL`]. Only one caller wins a due slot.
    fn throttled_evict_idle(&self, now: Instant) -> usize {
        let now_ms = u64::try_from(now.duration_since(self.created_at).as_millis())
            .unwrap_or(NEVER_SWEPT - 1);
        let interval_ms = u64::try_from(INLINE_EVICTION_INTERVAL.as_millis()).unwrap_or(u64::MAX);

        let last = self.last_inline_sweep_ms.load(Ordering::Acquire);
        if last != NEVER_SWEPT && now_ms.saturating_sub(last) < interval_ms {
            return 0;
        }
        if self
            .last_inline_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return 0;
        }

        evict_idle_clients(&self.clients, self.idle_ttl, now)
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Spawns periodic idle-client eviction until `shutdown_rx` fires.
    pub fn start_cleanup_task(
        &self,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let clients = Arc::clone(&self.clients);
        let idle_ttl = self.idle_ttl;

        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "starting rate limiter eviction task");
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = evict_idle_clients(&clients, idle_ttl, Instant::now());
                        if evicted > 0 {
                            debug!(evicted = evicted, tracked = clients.len(), "evicted idle rate limit clients");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("rate limiter eviction task shutting down");
                        break;
                    }
                }
            }
        })
    }
}
