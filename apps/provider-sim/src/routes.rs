use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use payrail_provider::ProviderResult;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::failure::FailureConfig;
use crate::simulate::{self, RpcOutcome};
use crate::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "provider-sim" }))
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeBody {
    pub payment_id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub pan: String,
    #[serde(default)]
    pub expiry: String,
    #[serde(default)]
    pub merchant_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CaptureBody {
    pub payment_id: String,
    #[serde(default)]
    pub provider_ref: String,
    #[serde(default)]
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct RefundBody {
    pub payment_id: String,
    #[serde(default)]
    pub provider_ref: String,
    #[serde(default)]
    pub amount: i64,
}

async fn respond(
    state: AppState,
    provider_id: String,
    action: &'static str,
    payment_id: String,
    authorized_event_pair: Option<(&'static str, &'static str)>,
) -> Result<Json<ProviderResult>, StatusCode> {
    match simulate::simulate(&state, &provider_id, action).await {
        RpcOutcome::Timeout => Err(StatusCode::GATEWAY_TIMEOUT),
        RpcOutcome::TransportError => Err(StatusCode::INTERNAL_SERVER_ERROR),
        RpcOutcome::Result(result) => {
            if let Some((on_success, on_failure)) = authorized_event_pair {
                let event_type = if result.success { on_success } else { on_failure };
                let data = json!({
                    "payment_id": payment_id,
                    "provider_ref": result.provider_ref,
                    "decline_reason": result.decline_reason,
                });
                let sim_state = state.clone();
                let provider_id = provider_id.clone();
                let event_type = event_type.to_string();
                tokio::spawn(async move {
                    simulate::send_webhook(&sim_state, &provider_id, &event_type, data).await;
                });
            }
            Ok(Json(result))
        }
    }
}

pub async fn authorize(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Json(body): Json<AuthorizeBody>,
) -> Result<Json<ProviderResult>, StatusCode> {
    respond(
        state,
        provider_id,
        "authorize",
        body.payment_id,
        Some(("payment.authorized", "payment.declined")),
    )
    .await
}

pub async fn capture(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Json(body): Json<CaptureBody>,
) -> Result<Json<ProviderResult>, StatusCode> {
    respond(
        state,
        provider_id,
        "capture",
        body.payment_id,
        Some(("payment.captured", "payment.capture_failed")),
    )
    .await
}

pub async fn refund(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Json(body): Json<RefundBody>,
) -> Result<Json<ProviderResult>, StatusCode> {
    respond(
        state,
        provider_id,
        "refund",
        body.payment_id,
        Some(("refund.succeeded", "refund.failed")),
    )
    .await
}

pub async fn get_config(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> Json<FailureConfig> {
    Json(simulate::get_provider_config(&state, &provider_id).await)
}

pub async fn set_config(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Json(config): Json<FailureConfig>,
) -> Json<FailureConfig> {
    simulate::set_provider_config(&state, &provider_id, config.clone()).await;
    Json(config)
}
