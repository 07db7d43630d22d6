//! `/payment-intents` handlers. Grounded on `routers/payments.py`: every
//! mutating call is wrapped in the idempotency check/store pair before and
//! after the underlying orchestrator call.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::correlation::correlation_id_from_headers;
use crate::error_response::ApiError;
use crate::payments::{
    authorize_payment, cancel_payment, capture_payment, create_payment, get_payment, list_payments,
    AuthorizePaymentRequest, CreatePaymentRequest,
};
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

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreatePaymentRequest>,
) -> Result<Response, ApiError> {
    let merchant_id = merchant_id(&headers)?;
    let idem_key = idempotency_key(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);

    let request_value = json!({
        "amount": body.amount,
        "currency": body.currency,
        "customer_email": body.customer_email,
        "description": body.description,
        "token": body.token,
        "metadata": body.metadata,
    });
    let request_hash = state.idempotency_payments.compute_hash(&request_value);
    if let Some((cached, status)) = state
        .idempotency_payments
        .check(&idem_key, &request_hash)
        .await?
    {
        return Ok((StatusCode::from_u16(status).unwrap_or(StatusCode::OK), Json(cached)).into_response());
    }

    let payment = create_payment(&state, body, &merchant_id, &correlation_id).await?;
    let response_value = serde_json::to_value(&payment).unwrap_or(Value::Null);
    state
        .idempotency_payments
        .store(&idem_key, &request_hash, response_value.clone(), 201)
        .await?;

    Ok((StatusCode::CREATED, Json(response_value)).into_response())
}

pub async fn get(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let payment = get_payment(&state, &payment_id).await?;
    Ok(Json(serde_json::to_value(payment).unwrap_or(Value::Null)))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let (items, total) = list_payments(
        &state,
        query.state.as_deref(),
        query.merchant_id.as_deref(),
        query.limit.min(500),
        query.offset,
    )
    .await?;
    Ok(Json(json!({
        "payments": items,
        "total": total,
        "limit": query.limit,
        "offset": query.offset,
    })))
}

pub async fn authorize(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AuthorizePaymentRequest>,
) -> Result<Json<Value>, ApiError> {
    let merchant_id = merchant_id(&headers)?;
    let idem_key = idempotency_key(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);

    let request_value = json!({
        "pan": body.pan,
        "expiry": body.expiry,
        "token": body.token,
        "country": body.country,
    });
    let request_hash = state.idempotency_payments.compute_hash(&request_value);
    if let Some((cached, _)) = state
        .idempotency_payments
        .check(&idem_key, &request_hash)
        .await?
    {
        return Ok(Json(cached));
    }

    let payment = authorize_payment(&state, &payment_id, body, &merchant_id, &correlation_id).await?;
    let response_value = serde_json::to_value(&payment).unwrap_or(Value::Null);
    state
        .idempotency_payments
        .store(&idem_key, &request_hash, response_value.clone(), 200)
        .await?;
    Ok(Json(response_value))
}

pub async fn capture(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let merchant_id = merchant_id(&headers)?;
    let idem_key = idempotency_key(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);

    let request_hash = state.idempotency_payments.compute_hash(&json!({ "op": "capture" }));
    if let Some((cached, _)) = state
        .idempotency_payments
        .check(&format!("{idem_key}:capture"), &request_hash)
        .await?
    {
        return Ok(Json(cached));
    }

    let payment = capture_payment(&state, &payment_id, &merchant_id, &correlation_id).await?;
    let response_value = serde_json::to_value(&payment).unwrap_or(Value::Null);
    state
        .idempotency_payments
        .store(&format!("{idem_key}:capture"), &request_hash, response_value.clone(), 200)
        .await?;
    Ok(Json(response_value))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let merchant_id = merchant_id(&headers)?;
    let idem_key = idempotency_key(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);

    let request_hash = state.idempotency_payments.compute_hash(&json!({ "op": "cancel" }));
    if let Some((cached, _)) = state
        .idempotency_payments
        .check(&format!("{idem_key}:cancel"), &request_hash)
        .await?
    {
        return Ok(Json(cached));
    }

    let payment = cancel_payment(&state, &payment_id, &merchant_id, &correlation_id).await?;
    let response_value = serde_json::to_value(&payment).unwrap_or(Value::Null);
    state
        .idempotency_payments
        .store(&format!("{idem_key}:cancel"), &request_hash, response_value.clone(), 200)
        .await?;
    Ok(Json(response_value))
}
