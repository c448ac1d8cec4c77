use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case("application/json"))
}

/// Rejects JSON-RPC bodies that are not sent as `application/json`.
pub async fn require_json_middleware(request: Request<Body>, next: Next) -> Response {
    let content_type = request.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    match content_type {
        Some(ct) if is_json(ct) => next.run(request).await,
        other => {
            tracing::warn!(content_type = other.unwrap_or("<missing>"), "invalid content type rejected");
            ApiError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "INVALID_REQUEST",
                "Content-Type must be application/json",
            )
            .into_response()
        }
    }
}
