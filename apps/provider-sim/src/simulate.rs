//! Core fault-injection logic for one simulated RPC call, grounded on
//! `provider_sim/main.py`'s `get_provider_config`/`send_webhook` and
//! `failure_injection.py`'s profile tables.

use chrono::Utc;
use payrail_provider::ProviderResult;
use payrail_types::ids::new_webhook_event_id;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::failure::{decline_reasons, default_profile, FailureConfig};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct SimState {
    provider_id: String,
    total_requests: u64,
    total_successes: u64,
    total_failures: u64,
    last_request_at: Option<chrono::DateTime<Utc>>,
    failure_config: Option<FailureConfig>,
}

fn sim_state_key(provider_id: &str) -> String {
    format!("providers/{provider_id}_sim.json")
}

pub async fn get_provider_config(state: &AppState, provider_id: &str) -> FailureConfig {
    let sim: SimState = state
        .store
        .read_json(&sim_state_key(provider_id))
        .await
        .unwrap_or_default();
    sim.failure_config.unwrap_or_else(|| default_profile(provider_id))
}

pub async fn set_provider_config(state: &AppState, provider_id: &str, config: FailureConfig) {
    let key = sim_state_key(provider_id);
    let mut sim: SimState = state.store.read_json(&key).await.unwrap_or_default();
    sim.provider_id = provider_id.to_string();
    sim.failure_config = Some(config);
    if let Err(error) = state.store.write_json(&key, &sim).await {
        tracing::warn!(%error, provider_id, "failed to persist fault-injection config");
    }
}

async fn record_outcome(state: &AppState, provider_id: &str, success: bool) {
    let key = sim_state_key(provider_id);
    let mut sim: SimState = state.store.read_json(&key).await.unwrap_or_default();
    sim.provider_id = provider_id.to_string();
    sim.total_requests += 1;
    if success {
        sim.total_successes += 1;
    } else {
        sim.total_failures += 1;
    }
    sim.last_request_at = Some(Utc::now());
    if let Err(error) = state.store.write_json(&key, &sim).await {
        tracing::warn!(%error, provider_id, "failed to persist provider-sim counters");
    }
}

/// What one simulated RPC did, so the caller can decide how to respond and
/// which webhook event type to emit.
pub enum RpcOutcome {
    /// Business success or business decline, both HTTP 200.
    Result(ProviderResult),
    /// Simulated transport failure: caller should respond with a non-2xx.
    TransportError,
    /// Simulated timeout: caller sleeps past the client's own timeout and
    /// never has to respond (the client has already given up).
    Timeout,
}

fn roll(state: &AppState, threshold: f64) -> bool {
    let mut rng = state.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    rng.random::<f64>() < threshold
}

fn latency_ms(state: &AppState, config: &FailureConfig) -> u64 {
    let mut rng = state.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    if config.latency_ms_max <= config.latency_ms_min {
        config.latency_ms_min
    } else {
        rng.random_range(config.latency_ms_min..=config.latency_ms_max)
    }
}

fn pick_decline_reason(state: &AppState, provider_id: &str) -> String {
    let reasons = decline_reasons(provider_id);
    let mut rng = state.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let idx = rng.random_range(0..reasons.len());
    reasons[idx].to_string()
}

/// Runs one simulated RPC: applies latency, then rolls timeout, transport
/// error, and business decline in that order, exactly as
/// `provider_sim/main.py`'s per-endpoint handlers do inline.
pub async fn simulate(state: &AppState, provider_id: &str, action: &str) -> RpcOutcome {
    let config = get_provider_config(state, provider_id).await;
    let delay = latency_ms(state, &config);
    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;

    if roll(state, config.timeout_rate) {
        record_outcome(state, provider_id, false).await;
        tokio::time::sleep(std::time::Duration::from_secs(12)).await;
        return RpcOutcome::Timeout;
    }

    if roll(state, config.error_rate) {
        record_outcome(state, provider_id, false).await;
        return RpcOutcome::TransportError;
    }

    let success = !roll(state, config.decline_rate);
    record_outcome(state, provider_id, success).await;

    let result = if success {
        ProviderResult {
            success: true,
            provider_ref: Some(format!("prv_{}", uuid_like(state))),
            decline_reason: None,
            extra: Some(json!({ "action": action })),
        }
    } else {
        ProviderResult {
            success: false,
            provider_ref: None,
            decline_reason: Some(pick_decline_reason(state, provider_id)),
            extra: None,
        }
    };
    RpcOutcome::Result(result)
}

fn uuid_like(state: &AppState) -> String {
    let mut rng = state.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    format!("{:06x}{:06x}", rng.random::<u32>() & 0xff_ffff, rng.random::<u32>() & 0xff_ffff)
}

/// Signs and posts a webhook callback, with duplicate-delivery injection.
/// Grounded on `provider_sim/main.py`'s `send_webhook`.
pub async fn send_webhook(state: &AppState, provider_id: &str, event_type: &str, data: Value) {
    let payload = json!({
        "id": new_webhook_event_id(),
        "type": event_type,
        "provider": provider_id,
        "data": data,
        "created_at": Utc::now(),
    });
    let Ok(body) = serde_json::to_vec(&payload) else {
        tracing::warn!(event_type, "failed to serialize webhook payload");
        return;
    };
    let signature = payrail_provider::signing::sign_payload(&state.config.webhook_secret, &body);

    post_webhook(state, &body, &signature).await;

    let config = get_provider_config(state, provider_id).await;
    if roll(state, config.duplicate_webhook_rate) {
        tracing::info!(event_type, provider_id, "injecting duplicate webhook delivery");
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        post_webhook(state, &body, &signature).await;
    }
}

async fn post_webhook(state: &AppState, body: &[u8], signature: &str) {
    let result = state
        .http
        .post(&state.config.webhook_callback_url)
        .header("Content-Type", "application/json")
        .header("X-Webhook-Signature", signature)
        .header("X-Correlation-Id", payrail_types::ids::new_correlation_id())
        .timeout(std::time::Duration::from_secs(10))
        .body(body.to_vec())
        .send()
        .await;
    match result {
        Ok(response) if response.status().is_success() => {
            tracing::info!("webhook delivered");
        }
        Ok(response) => {
            tracing::warn!(status = %response.status(), "webhook callback returned non-2xx");
        }
        Err(error) => {
            tracing::error!(%error, "webhook delivery failed");
        }
    }
}
