//! HTTP middleware for the gateway routes.
//!
//! Admission decisions live in `fxgate_core::rate_limit`; the adapters here only
//! translate them into headers and status codes.

pub mod rate_limiting;
pub mod request_context;
pub mod validation;

pub use rate_limiting::{apply_rate_limit_headers, rate_limit_middleware, RateLimitState};
pub use request_context::{
    create_request_id_layers, request_timeout_middleware, request_timing_middleware,
    UuidRequestIdGenerator, X_PROCESS_TIME, X_REQUEST_ID,
};
pub use validation::require_json_middleware;
