//! Upstream RPC endpoints and failover.
//!
//! - [`RpcTransport`] moves serialized requests over HTTP ([`HttpClient`] in production)
//! - [`RpcEndpoint`] tracks advisory health for one node
//! - [`RpcPool`] walks endpoints in priority order until one answers
//! - [`HealthChecker`] probes every endpoint in the background

pub mod endpoint;
pub mod errors;
pub mod health;
pub mod http_client;
pub mod pool;

pub use endpoint::{EndpointStatus, RpcEndpoint};
pub use errors::{EndpointFailure, RpcErrorCategory, UpstreamError};
pub use health::HealthChecker;
pub use http_client::{HttpClient, RpcTransport};
pub use pool::{parse_hex_u64, EndpointHealth, ProbeResult, RpcPool};
