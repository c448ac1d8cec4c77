//! Integration tests for fxgate.
//!
//! - `pool_failover_tests`: endpoint ordering, failover and health against mock nodes
//! - `gateway_flow_tests`: full HTTP stack: rate limiting, caching and the error envelope
//! - `runtime_tests`: builder validation, background tasks and shutdown
//! - `mock_infrastructure`: mockito-backed RPC nodes and request fixtures
//!
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod gateway_flow_tests;

#[cfg(test)]
mod pool_failover_tests;

#[cfg(test)]
mod runtime_tests;

pub mod mock_infrastructure;
