//! `/refunds` handlers. `approve`/`reject` need an actor identity distinct
//! from the original requester to enforce maker-checker; callers supply it
//! via `X-Actor` (defaults to `operator`, matching the `X-Role` default).

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::correlation::correlation_id_from_headers;
use crate::error_response::ApiError;
use crate::refunds::{
    approve_refund, create_refund, get_refund, list_refunds, reject_refund, CreateRefundRequest,
};
use crate::routes::headers::{idempotency_key, merchant_id};
use crate::state::AppState;

fn actor(headers: &HeaderMap) -> String {
    headers
        .get("x-actor")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| "operator".to_string())
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    merchant_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    100
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateRefundRequest>,
) -> Result<Json<Value>, ApiError> {
    let merchant_id = merchant_id(&headers)?;
    let idem_key = idempotency_key(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);
    let requested_by = actor(&headers);

    let request_value = json!({
        "payment_id": body.payment_id,
        "amount": body.amount,
        "reason": body.reason,
    });
    let request_hash = state.idempotency_refunds.compute_hash(&request_value);
    if let Some((cached, _)) = state.idempotency_refunds.check(&idem_key, &request_hash).await? {
        return Ok(Json(cached));
    }

    let refund = create_refund(&state, body, &merchant_id, &requested_by, &correlation_id).await?;
    let response_value = serde_json::to_value(&refund).unwrap_or(Value::Null);
    state
        .idempotency_refunds
        .store(&idem_key, &request_hash, response_value.clone(), 201)
        .await?;
    Ok(Json(response_value))
}

pub async fn get(
    State(state): State<AppState>,
    Path(refund_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let refund = get_refund(&state, &refund_id).await?;
    Ok(Json(serde_json::to_value(refund).unwrap_or(Value::Null)))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let (items, total) = list_refunds(
        &state,
        query.state.as_deref(),
        query.merchant_id.as_deref(),
        query.limit.min(500),
        query.offset,
    )
    .await?;
    Ok(Json(json!({
        "refunds": items,
        "total": total,
        "limit": query.limit,
        "offset": query.offset,
    })))
}

pub async fn approve(
    State(state): State<AppState>,
    Path(refund_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let idem_key = idempotency_key(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);
    let approved_by = actor(&headers);

    let request_hash = state.idempotency_refunds.compute_hash(&json!({ "op": "approve" }));
    if let Some((cached, _)) = state
        .idempotency_refunds
        .check(&format!("{idem_key}:approve"), &request_hash)
        .await?
    {
        return Ok(Json(cached));
    }

    let refund = approve_refund(&state, &refund_id, &approved_by, &correlation_id).await?;
    let response_value = serde_json::to_value(&refund).unwrap_or(Value::Null);
    state
        .idempotency_refunds
        .store(&format!("{idem_key}:approve"), &request_hash, response_value.clone(), 200)
        .await?;
    Ok(Json(response_value))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(refund_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let idem_key = idempotency_key(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);
    let rejected_by = actor(&headers);

    let request_hash = state.idempotency_refunds.compute_hash(&json!({ "op": "reject" }));
    if let Some((cached, _)) = state
        .idempotency_refunds
        .check(&format!("{idem_key}:reject"), &request_hash)
        .await?
    {
        return Ok(Json(cached));
    }

    let refund = reject_refund(&state, &refund_id, &rejected_by, &correlation_id).await?;
    let response_value = serde_json::to_value(&refund).unwrap_or(Value::Null);
    state
        .idempotency_refunds
        .store(&format!("{idem_key}:reject"), &request_hash, response_value.clone(), 200)
        .await?;
    Ok(Json(response_value))
}
