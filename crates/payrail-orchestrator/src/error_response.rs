//! Maps `CoreError` to the HTTP disposition table in the error-handling
//! design: `{detail: <message>}` bodies, correlation id echoed on every
//! response. Mirrors the teacher's per-component error → status mapping
//! (`wallet_executor_error_response`, `neobank_error_response`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use payrail_types::CoreError;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::IdempotencyConflict { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::InvalidTransition { .. } => StatusCode::CONFLICT,
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            CoreError::ProviderUnavailable
            | CoreError::ProviderTimeout
            | CoreError::ProviderError { .. } => StatusCode::BAD_GATEWAY,
            CoreError::MakerCheckerViolation => StatusCode::FORBIDDEN,
            CoreError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            CoreError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maker_checker_violation_maps_to_forbidden() {
        let api_err: ApiError = CoreError::MakerCheckerViolation.into();
        assert_eq!(api_err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn not_found_maps_to_404() {
        let api_err: ApiError = CoreError::NotFound {
            entity: "payment",
            id: "pi_1".to_string(),
        }
        .into();
        assert_eq!(api_err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn provider_timeout_maps_to_bad_gateway() {
        let api_err: ApiError = CoreError::ProviderTimeout.into();
        assert_eq!(api_err.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn invalid_request_maps_to_400() {
        let api_err: ApiError = CoreError::InvalidRequest {
            message: "bad input".to_string(),
        }
        .into();
        assert_eq!(api_err.status, StatusCode::BAD_REQUEST);
        assert_eq!(api_err.detail, CoreError::InvalidRequest { message: "bad input".to_string() }.to_string());
    }
}
