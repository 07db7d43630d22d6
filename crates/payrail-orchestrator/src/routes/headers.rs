//! Required/optional request headers shared by every route handler.

use axum::http::HeaderMap;

use crate::error_response::ApiError;

pub fn merchant_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-merchant-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "missing X-Merchant-Id header"))
}

pub fn idempotency_key(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::new(axum::http::StatusCode::BAD_REQUEST, "missing Idempotency-Key header"))
}

pub fn role(headers: &HeaderMap) -> String {
    headers
        .get("x-role")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| "operator".to_string())
}
