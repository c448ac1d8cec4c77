//! # fxgate core
//!
//! Request-handling infrastructure for the fxgate HTTP gateway over blockchain JSON-RPC.
//!
//! - **[`cache`]**: in-memory response cache with per-entry TTL and a background sweep.
//!   Never returns stale values and fails open.
//!
//! - **[`upstream`]**: ordered RPC endpoint pool with per-attempt timeouts, failover in
//!   priority order and advisory health tracking.
//!
//! - **[`rate_limit`]**: per-client fixed windows over a minute, an hour and a day,
//!   checked and incremented atomically.
//!
//! - **[`gateway`]**: the read path the HTTP routes share: validate, cache lookup, pool
//!   call, cache store.
//!
//! - **[`transactions`]**: status tracking for signed transactions broadcast through the
//!   gateway, aged out after a day.
//!
//! - **[`runtime`]**: builds the components from [`config`] and owns their background tasks.
//!
//! - **[`metrics`]**: Prometheus metrics through the `metrics` facade.
//!
//! ## Request Flow
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌──────────────┐
//! │ Rate Limiter │ ─── Exhausted ──► 429 + Retry-After
//! └──────┬───────┘
//!        │ Admitted
//!        ▼
//! ┌──────────────┐
//! │  Validation  │ ─── Invalid ──► 400
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ Cache Lookup │ ─── Hit ──► Cached Response
//! └──────┬───────┘
//!        │ Miss
//!        ▼
//! ┌──────────────┐
//! │   RpcPool    │ ─── All endpoints failed ──► 503
//! │  A → B → C   │
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ Cache Store  │
//! └──────┬───────┘
//!        ▼
//!   Response + rate-limit headers
//! ```

pub mod cache;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod rate_limit;
pub mod runtime;
pub mod transactions;
pub mod types;
pub mod upstream;
