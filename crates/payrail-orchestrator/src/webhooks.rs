//! Inbound provider webhook ingress. Grounded on `shared/middleware.py`'s
//! signature check and the provider callback shape in `provider_sim/main.py`:
//! verify HMAC, dedup by event id against a persisted processed-id set,
//! apply a conservative forward-only transition, append a `webhook.*`
//! ledger entry, and mark the event processed regardless of whether it
//! matched a known payment — a replayed or unknown event must never be
//! retried forever.

use std::collections::BTreeSet;

use chrono::Utc;
use payrail_types::{CoreError, PaymentIntent, PaymentState};
use serde::Deserialize;
use serde_json::Value;

use crate::payments::store_err;
use crate::signing::verify_signature;
use crate::state::AppState;

const PROCESSED_WEBHOOKS_KEY: &str = "outbox/processed_webhooks.json";
const PAYMENTS_STORE: &str = "idempotency/payments_store.json";

/// Matches the envelope every real producer sends: `provider-sim`'s
/// `send_webhook` and the gateway's own `outbox_dispatcher::dispatch_event`
/// both wrap `{id, type, data, created_at}`, not a flat payload.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(alias = "event_id")]
    pub id: String,
    #[serde(alias = "event_type")]
    pub r#type: String,
    #[serde(default)]
    pub data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookData {
    pub payment_id: Option<String>,
    #[serde(default)]
    pub provider_ref: Option<String>,
    #[serde(default)]
    pub decline_reason: Option<String>,
}

pub struct WebhookOutcome {
    pub duplicate: bool,
    pub applied: bool,
}

fn target_state_for(event_type: &str) -> Option<PaymentState> {
    match event_type {
        "payment.authorized" => Some(PaymentState::Authorized),
        "payment.captured" => Some(PaymentState::Captured),
        "payment.declined" => Some(PaymentState::Declined),
        _ => None,
    }
}

pub async fn handle_webhook(
    state: &AppState,
    raw_body: &[u8],
    signature: &str,
    correlation_id: &str,
) -> Result<WebhookOutcome, CoreError> {
    if !verify_signature(&state.config.webhook_secret, raw_body, signature) {
        return Err(CoreError::Unauthorized {
            reason: "invalid webhook signature".to_string(),
        });
    }

    let payload: WebhookPayload = serde_json::from_slice(raw_body).map_err(|e| CoreError::InvalidRequest {
        message: format!("malformed webhook body: {e}"),
    })?;

    let mut processed: BTreeSet<String> = state
        .store
        .read_json(PROCESSED_WEBHOOKS_KEY)
        .await
        .map_err(store_err)?;

    if processed.contains(&payload.id) {
        return Ok(WebhookOutcome {
            duplicate: true,
            applied: false,
        });
    }

    let mut applied = false;
    if let (Some(target), Some(payment_id)) =
        (target_state_for(&payload.r#type), payload.data.payment_id.as_deref())
    {
        let mut payments: std::collections::BTreeMap<String, PaymentIntent> =
            state.store.read_json(PAYMENTS_STORE).await.map_err(store_err)?;

        if let Some(payment) = payments.get_mut(payment_id) {
            if payrail_types::state_machine::validate_payment_transition(payment.state, target).is_ok()
            {
                payment.state = target;
                payment.updated_at = Utc::now();
                if payload.data.provider_ref.is_some() {
                    payment.provider_ref = payload.data.provider_ref.clone();
                }
                if payload.data.decline_reason.is_some() {
                    payment.decline_reason = payload.data.decline_reason.clone();
                }
                let snapshot = serde_json::to_value(&*payment).unwrap_or(Value::Null);
                let (amount, currency, merchant_id, provider) = (
                    payment.amount,
                    payment.currency.clone(),
                    payment.merchant_id.clone(),
                    payment.provider.clone(),
                );
                state
                    .store
                    .write_json(PAYMENTS_STORE, &payments)
                    .await
                    .map_err(store_err)?;
                state
                    .ledger
                    .write_entry(
                        "webhook.applied",
                        payment_id,
                        amount,
                        &currency,
                        &merchant_id,
                        provider.as_deref(),
                        correlation_id,
                        snapshot,
                    )
                    .await
                    .map_err(store_err)?;
                applied = true;
            }
        }
    }

    processed.insert(payload.id.clone());
    state
        .store
        .write_json(PROCESSED_WEBHOOKS_KEY, &processed)
        .await
        .map_err(store_err)?;

    Ok(WebhookOutcome {
        duplicate: false,
        applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use payrail_provider::signing::sign_payload;
    use std::collections::BTreeMap;

    fn test_state(dir: &std::path::Path) -> AppState {
        AppState::new(Config {
            data_dir: dir.to_string_lossy().to_string(),
            provider_sim_url: "http://127.0.0.1:9".to_string(),
            webhook_secret: "whsec_test".to_string(),
            webhook_callback_url: "http://127.0.0.1:9/webhooks/provider".to_string(),
            default_provider: "providerA".to_string(),
            failover_provider: "providerB".to_string(),
            cb_failure_threshold: 5,
            cb_recovery_timeout_s: 30,
            cb_half_open_max_calls: 3,
            outbox_interval_s: 5,
            settlement_interval_s: 10,
            reconciliation_interval_s: 3600,
            bind_addr: "127.0.0.1:0".to_string(),
        })
    }

    async fn seed_payment(state: &AppState, id: &str) {
        let now = Utc::now();
        let payment = PaymentIntent {
            id: id.to_string(),
            amount: 1000,
            currency: "USD".to_string(),
            merchant_id: "m_001".to_string(),
            customer_email: None,
            description: None,
            provider: Some("providerA".to_string()),
            token: None,
            provider_ref: None,
            decline_reason: None,
            idempotency_key: String::new(),
            correlation_id: "corr_seed".to_string(),
            created_at: now,
            updated_at: now,
            metadata: BTreeMap::new(),
            state: PaymentState::Created,
        };
        let mut payments = BTreeMap::new();
        payments.insert(payment.id.clone(), payment);
        state
            .store
            .write_json(PAYMENTS_STORE, &payments)
            .await
            .unwrap();
    }

    /// Mirrors the real envelope every producer sends (`{id, type, provider,
    /// data, created_at}`), not a flattened fixture.
    fn body_for(event_id: &str, payment_id: &str, event_type: &str) -> Vec<u8> {
        envelope(event_id, payment_id, event_type, None, None)
    }

    fn envelope(
        event_id: &str,
        payment_id: &str,
        event_type: &str,
        provider_ref: Option<&str>,
        decline_reason: Option<&str>,
    ) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": event_id,
            "type": event_type,
            "provider": "providerA",
            "data": {
                "payment_id": payment_id,
                "provider_ref": provider_ref,
                "decline_reason": decline_reason,
            },
            "created_at": Utc::now(),
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn rejects_invalid_signature() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let body = body_for("evt_1", "pi_1", "payment.authorized");

        let err = handle_webhook(&state, &body, "sha256=not_a_real_signature", "corr_1")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn applies_valid_transition_and_marks_processed() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        seed_payment(&state, "pi_1").await;
        let body = body_for("evt_1", "pi_1", "payment.authorized");
        let signature = sign_payload("whsec_test", &body);

        let outcome = handle_webhook(&state, &body, &signature, "corr_1").await.unwrap();
        assert!(!outcome.duplicate);
        assert!(outcome.applied);

        let payments: BTreeMap<String, PaymentIntent> =
            state.store.read_json(PAYMENTS_STORE).await.unwrap();
        assert_eq!(payments.get("pi_1").unwrap().state, PaymentState::Authorized);
    }

    #[tokio::test]
    async fn authorized_webhook_records_provider_ref_and_declined_records_reason() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        seed_payment(&state, "pi_1").await;
        let body = envelope("evt_1", "pi_1", "payment.authorized", Some("prv_abc123"), None);
        let signature = sign_payload("whsec_test", &body);
        handle_webhook(&state, &body, &signature, "corr_1").await.unwrap();

        let payments: BTreeMap<String, PaymentIntent> =
            state.store.read_json(PAYMENTS_STORE).await.unwrap();
        assert_eq!(payments.get("pi_1").unwrap().provider_ref.as_deref(), Some("prv_abc123"));

        seed_payment(&state, "pi_2").await;
        let body = envelope("evt_2", "pi_2", "payment.declined", None, Some("insufficient_funds"));
        let signature = sign_payload("whsec_test", &body);
        handle_webhook(&state, &body, &signature, "corr_2").await.unwrap();

        let payments: BTreeMap<String, PaymentIntent> =
            state.store.read_json(PAYMENTS_STORE).await.unwrap();
        assert_eq!(
            payments.get("pi_2").unwrap().decline_reason.as_deref(),
            Some("insufficient_funds")
        );
    }

    #[tokio::test]
    async fn replayed_event_id_is_reported_as_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        seed_payment(&state, "pi_1").await;
        let body = body_for("evt_1", "pi_1", "payment.authorized");
        let signature = sign_payload("whsec_test", &body);

        handle_webhook(&state, &body, &signature, "corr_1").await.unwrap();
        let second = handle_webhook(&state, &body, &signature, "corr_2").await.unwrap();
        assert!(second.duplicate);
        assert!(!second.applied);
    }

    #[tokio::test]
    async fn unknown_payment_is_marked_processed_without_applying() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let body = body_for("evt_1", "pi_missing", "payment.authorized");
        let signature = sign_payload("whsec_test", &body);

        let outcome = handle_webhook(&state, &body, &signature, "corr_1").await.unwrap();
        assert!(!outcome.duplicate);
        assert!(!outcome.applied);

        let replay = handle_webhook(&state, &body, &signature, "corr_2").await.unwrap();
        assert!(replay.duplicate);
    }
}
