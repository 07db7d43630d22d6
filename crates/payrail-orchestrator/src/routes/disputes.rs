//! `/disputes` handlers. Grounded on `routers/disputes.py`.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::correlation::correlation_id_from_headers;
use crate::disputes::{
    create_dispute, get_dispute, list_disputes, resolve_dispute, submit_evidence, CreateDisputeRequest,
    ResolveDisputeRequest,
};
use crate::error_response::ApiError;
use crate::routes::headers::{idempotency_key, merchant_id};
use crate::state::AppState;

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

#[derive(Debug, Deserialize)]
pub struct SubmitEvidenceRequest {
    pub evidence: String,
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateDisputeRequest>,
) -> Result<Json<Value>, ApiError> {
    let merchant_id = merchant_id(&headers)?;
    let idem_key = idempotency_key(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);

    let request_value = json!({
        "payment_id": body.payment_id,
        "amount": body.amount,
        "reason": body.reason,
    });
    let request_hash = state.idempotency_disputes.compute_hash(&request_value);
    if let Some((cached, _)) = state.idempotency_disputes.check(&idem_key, &request_hash).await? {
        return Ok(Json(cached));
    }

    let dispute = create_dispute(&state, body, &merchant_id, &correlation_id).await?;
    let response_value = serde_json::to_value(&dispute).unwrap_or(Value::Null);
    state
        .idempotency_disputes
        .store(&idem_key, &request_hash, response_value.clone(), 201)
        .await?;
    Ok(Json(response_value))
}

pub async fn get(
    State(state): State<AppState>,
    Path(dispute_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let dispute = get_dispute(&state, &dispute_id).await?;
    Ok(Json(serde_json::to_value(dispute).unwrap_or(Value::Null)))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let (items, total) = list_disputes(
        &state,
        query.state.as_deref(),
        query.merchant_id.as_deref(),
        query.limit.min(500),
        query.offset,
    )
    .await?;
    Ok(Json(json!({
        "disputes": items,
        "total": total,
        "limit": query.limit,
        "offset": query.offset,
    })))
}

pub async fn submit_evidence_handler(
    State(state): State<AppState>,
    Path(dispute_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SubmitEvidenceRequest>,
) -> Result<Json<Value>, ApiError> {
    let merchant_id = merchant_id(&headers)?;
    let idem_key = idempotency_key(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);

    let request_hash = state
        .idempotency_disputes
        .compute_hash(&json!({ "op": "submit_evidence", "evidence": body.evidence.clone() }));
    if let Some((cached, _)) = state
        .idempotency_disputes
        .check(&format!("{idem_key}:evidence"), &request_hash)
        .await?
    {
        return Ok(Json(cached));
    }

    let dispute = submit_evidence(&state, &dispute_id, body.evidence, &merchant_id, &correlation_id).await?;
    let response_value = serde_json::to_value(&dispute).unwrap_or(Value::Null);
    state
        .idempotency_disputes
        .store(&format!("{idem_key}:evidence"), &request_hash, response_value.clone(), 200)
        .await?;
    Ok(Json(response_value))
}

pub async fn resolve(
    State(state): State<AppState>,
    Path(dispute_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ResolveDisputeRequest>,
) -> Result<Json<Value>, ApiError> {
    let merchant_id = merchant_id(&headers)?;
    let idem_key = idempotency_key(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);

    let request_hash = state
        .idempotency_disputes
        .compute_hash(&json!({ "op": "resolve", "outcome": body.outcome.clone() }));
    if let Some((cached, _)) = state
        .idempotency_disputes
        .check(&format!("{idem_key}:resolve"), &request_hash)
        .await?
    {
        return Ok(Json(cached));
    }

    let dispute = resolve_dispute(&state, &dispute_id, body, &merchant_id, &correlation_id).await?;
    let response_value = serde_json::to_value(&dispute).unwrap_or(Value::Null);
    state
        .idempotency_disputes
        .store(&format!("{idem_key}:resolve"), &request_hash, response_value.clone(), 200)
        .await?;
    Ok(Json(response_value))
}
