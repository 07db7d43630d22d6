//! `/health`, `/providers/health`, `/metrics`, `/ledger/:ref_id`. Grounded
//! on `routers/health.py`.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error_response::ApiError;
use crate::payments::store_err;
use crate::state::AppState;

const PROVIDERS: [&str; 2] = ["providerA", "providerB"];

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "payrail-gateway" }))
}

pub async fn provider_health(State(state): State<AppState>) -> Json<Value> {
    let mut providers = Vec::new();
    for provider_id in PROVIDERS {
        let breaker_state = state.breaker.get_state(provider_id).await;
        let can_execute = state.breaker.can_execute(provider_id).await;
        providers.push(json!({
            "provider_id": provider_id,
            "circuit_state": breaker_state.circuit_state.as_str(),
            "failure_count": breaker_state.failure_count,
            "success_count": breaker_state.success_count,
            "total_requests": breaker_state.total_requests,
            "last_failure_at": breaker_state.last_failure_at,
            "last_success_at": breaker_state.last_success_at,
            "can_execute": can_execute,
        }));
    }
    Json(json!({ "providers": providers }))
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    100
}

pub async fn metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut entries: Vec<Value> = state
        .store
        .read_jsonl("metrics/service_metrics.jsonl")
        .await
        .map_err(store_err)?;
    entries.reverse();
    let total = entries.len();
    entries.truncate(query.limit.min(1000));
    Ok(Json(json!({ "entries": entries, "total": total })))
}

pub async fn ledger_entries(
    State(state): State<AppState>,
    Path(ref_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let entries = state.ledger.get_entries_for_ref(&ref_id).await.map_err(store_err)?;
    let total = entries.len();
    Ok(Json(json!({ "ref_id": ref_id, "entries": entries, "total": total })))
}
