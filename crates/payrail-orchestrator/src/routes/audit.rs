//! `/audit/*` read-only endpoints. Grounded on `routers/audit.py`.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error_response::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    #[serde(default)]
    ref_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    100
}

async fn ledger_family(
    state: &AppState,
    family: &str,
    query: LedgerQuery,
) -> Result<Json<Value>, ApiError> {
    if let Some(ref_id) = query.ref_id {
        let entries = state
            .ledger
            .get_entries_for_ref(&ref_id)
            .await
            .map_err(crate::payments::store_err)?;
        let total = entries.len();
        return Ok(Json(json!({ "entries": entries, "total": total })));
    }
    let (entries, total) = state
        .ledger
        .get_all_entries(family, query.limit.min(500), query.offset)
        .await
        .map_err(crate::payments::store_err)?;
    Ok(Json(json!({
        "entries": entries,
        "total": total,
        "limit": query.limit,
        "offset": query.offset,
    })))
}

pub async fn payments(
    State(state): State<AppState>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<Value>, ApiError> {
    ledger_family(&state, "payment", query).await
}

pub async fn refunds(
    State(state): State<AppState>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<Value>, ApiError> {
    ledger_family(&state, "refund", query).await
}

pub async fn disputes(
    State(state): State<AppState>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<Value>, ApiError> {
    ledger_family(&state, "dispute", query).await
}

#[derive(Debug, Deserialize)]
pub struct VaultAccessQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

pub async fn vault_access(
    State(state): State<AppState>,
    Query(query): Query<VaultAccessQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut entries: Vec<payrail_types::VaultAccessLogEntry> = state
        .store
        .read_jsonl("vault/access_log.jsonl")
        .await
        .map_err(crate::payments::store_err)?;
    entries.reverse();
    let total = entries.len();
    entries.truncate(query.limit.min(500));
    Ok(Json(json!({ "entries": entries, "total": total })))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default = "default_entity_type")]
    entity_type: String,
}

fn default_entity_type() -> String {
    "payment".to_string()
}

pub async fn export(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Json<Value>, ApiError> {
    let (entries, total) = state
        .ledger
        .get_all_entries(&query.entity_type, 10_000, 0)
        .await
        .map_err(crate::payments::store_err)?;
    Ok(Json(json!({
        "entity_type": query.entity_type,
        "entries": entries,
        "total": total,
        "exported_at": chrono::Utc::now(),
    })))
}

pub async fn reconciliation(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let keys = state
        .store
        .list_keys_under("reconciliation")
        .await
        .map_err(crate::payments::store_err)?;
    let mut reports = Vec::new();
    for key in keys.into_iter().rev() {
        let report: Value = state
            .store
            .read_json(&key)
            .await
            .map_err(crate::payments::store_err)?;
        reports.push(report);
    }
    Ok(Json(json!({ "reports": reports })))
}

pub async fn settlements(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let keys = state
        .store
        .list_keys_under("settlement")
        .await
        .map_err(crate::payments::store_err)?;
    let mut settlements = Vec::new();
    for key in keys.into_iter().rev() {
        let rows = state
            .store
            .read_csv(&key)
            .await
            .map_err(crate::payments::store_err)?;
        let total_amount: i64 = rows
            .iter()
            .map(|r| r.get("amount").and_then(|v| v.parse::<i64>().ok()).unwrap_or(0))
            .sum();
        settlements.push(json!({
            "file": key,
            "rows": rows.len(),
            "total_amount": total_amount,
            "data": rows,
        }));
    }
    Ok(Json(json!({ "settlements": settlements })))
}
