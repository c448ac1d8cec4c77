//! JSON error envelope returned by every route.
//!
//! ```json
//! {"error": true, "code": "UPSTREAM_UNAVAILABLE", "message": "...", "details": {...}}
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fxgate_core::{
    gateway::{GatewayError, ValidationError},
    upstream::UpstreamError,
};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: bool,
    code: &'a str,
    message: &'a str,
    details: Option<&'a Value>,
}

/// An HTTP error with a stable machine-readable code.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), details: None }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMIT_EXCEEDED",
            format!("Rate limit exceeded. Try again in {retry_after_secs} seconds."),
        )
        .with_details(json!({ "retry_after": retry_after_secs }))
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found")
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let code = match err {
            ValidationError::InvalidAddress(_) => "INVALID_ADDRESS",
            ValidationError::InvalidTxHash(_) => "INVALID_TX_HASH",
            ValidationError::InvalidRawTransaction(_) => "INVALID_TRANSACTION_FORMAT",
            ValidationError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            ValidationError::InvalidVersion(_) |
            ValidationError::InvalidMethod(_) |
            ValidationError::InvalidBlockParameter(_) => "INVALID_REQUEST",
        };
        Self::new(StatusCode::BAD_REQUEST, code, err.to_string())
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Unavailable { attempts } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "UPSTREAM_UNAVAILABLE",
                "All RPC endpoints are unavailable. Please retry shortly.",
            )
            .with_details(json!({ "attempts": attempts })),
            UpstreamError::RpcError(code, message) => {
                Self::new(StatusCode::BAD_REQUEST, "RPC_ERROR", message)
                    .with_details(json!({ "rpc_code": code }))
            }
            other => {
                tracing::error!(error = %other, "unexpected upstream error");
                Self::internal("Internal server error")
            }
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(e) => e.into(),
            GatewayError::Upstream(e) => e.into(),
            GatewayError::Internal(message) => {
                tracing::error!(error = %message, "internal gateway error");
                Self::internal("Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: true,
            code: self.code,
            message: &self.message,
            details: self.details.as_ref(),
        };
        (self.status, Json(body)).into_response()
    }
}
