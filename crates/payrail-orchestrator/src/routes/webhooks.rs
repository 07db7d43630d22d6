//! `/webhooks/provider` ingress. Grounded on `routers/webhooks.py`.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::correlation::correlation_id_from_headers;
use crate::error_response::ApiError;
use crate::state::AppState;
use crate::webhooks::handle_webhook;

pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let correlation_id = correlation_id_from_headers(&headers);

    let outcome = handle_webhook(&state, &body, signature, &correlation_id).await?;
    if outcome.duplicate {
        return Ok(Json(json!({ "status": "duplicate" })));
    }
    Ok(Json(json!({ "status": "processed", "applied": outcome.applied })))
}
