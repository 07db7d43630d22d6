//! Dispute lifecycle. Opening a dispute against a captured or settled
//! payment flips the payment itself to `chargeback`, per `routers/disputes.py`.

use std::collections::BTreeMap;

use chrono::Utc;
use payrail_types::{new_dispute_id, CoreError, Dispute, DisputeState, PaymentIntent, PaymentState};
use serde::Deserialize;
use serde_json::Value;

use crate::payments::{get_payment, store_err};
use crate::state::AppState;

const DISPUTES_STORE: &str = "idempotency/disputes_store.json";
const PAYMENTS_STORE: &str = "idempotency/payments_store.json";

#[derive(Debug, Deserialize)]
pub struct CreateDisputeRequest {
    pub payment_id: String,
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveDisputeRequest {
    pub outcome: String,
}

async fn load_disputes(state: &AppState) -> Result<BTreeMap<String, Dispute>, CoreError> {
    state.store.read_json(DISPUTES_STORE).await.map_err(store_err)
}

async fn save_dispute(state: &AppState, dispute: &Dispute) -> Result<(), CoreError> {
    let mut disputes = load_disputes(state).await?;
    disputes.insert(dispute.id.clone(), dispute.clone());
    state
        .store
        .write_json(DISPUTES_STORE, &disputes)
        .await
        .map_err(store_err)
}

async fn load_payments(state: &AppState) -> Result<BTreeMap<String, PaymentIntent>, CoreError> {
    state.store.read_json(PAYMENTS_STORE).await.map_err(store_err)
}

async fn save_payment(state: &AppState, payment: &PaymentIntent) -> Result<(), CoreError> {
    let mut payments = load_payments(state).await?;
    payments.insert(payment.id.clone(), payment.clone());
    state
        .store
        .write_json(PAYMENTS_STORE, &payments)
        .await
        .map_err(store_err)
}

pub async fn get_dispute(state: &AppState, dispute_id: &str) -> Result<Dispute, CoreError> {
    let disputes = load_disputes(state).await?;
    disputes.get(dispute_id).cloned().ok_or_else(|| CoreError::NotFound {
        entity: "dispute",
        id: dispute_id.to_string(),
    })
}

pub async fn list_disputes(
    state: &AppState,
    filter_state: Option<&str>,
    merchant_id: Option<&str>,
    limit: usize,
    offset: usize,
) -> Result<(Vec<Dispute>, usize), CoreError> {
    let disputes = load_disputes(state).await?;
    let mut items: Vec<Dispute> = disputes.into_values().collect();
    if let Some(filter_state) = filter_state {
        items.retain(|d| d.state.as_str() == filter_state);
    }
    if let Some(merchant_id) = merchant_id {
        items.retain(|d| d.merchant_id == merchant_id);
    }
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let total = items.len();
    let page = items.into_iter().skip(offset).take(limit).collect();
    Ok((page, total))
}

pub async fn create_dispute(
    state: &AppState,
    req: CreateDisputeRequest,
    merchant_id: &str,
    correlation_id: &str,
) -> Result<Dispute, CoreError> {
    let mut payments = load_payments(state).await?;
    let payment = payments
        .get_mut(&req.payment_id)
        .ok_or_else(|| CoreError::NotFound {
            entity: "payment",
            id: req.payment_id.clone(),
        })?;

    if matches!(payment.state, PaymentState::Captured | PaymentState::Settled) {
        payrail_types::state_machine::validate_payment_transition(
            payment.state,
            PaymentState::Chargeback,
        )?;
        payment.state = PaymentState::Chargeback;
        payment.updated_at = Utc::now();
        let payment_snapshot = payment.clone();
        state
            .store
            .write_json(PAYMENTS_STORE, &payments)
            .await
            .map_err(store_err)?;

        let ledger_snapshot = serde_json::to_value(&payment_snapshot).unwrap_or(Value::Null);
        state
            .ledger
            .write_entry(
                "payment.chargeback",
                &req.payment_id,
                payment_snapshot.amount,
                &payment_snapshot.currency,
                merchant_id,
                payment_snapshot.provider.as_deref(),
                correlation_id,
                ledger_snapshot,
            )
            .await
            .map_err(store_err)?;
    } else {
        save_payment(state, payment).await?;
    }

    let now = Utc::now();
    let dispute = Dispute {
        id: new_dispute_id(),
        payment_id: req.payment_id.clone(),
        amount: req.amount,
        state: DisputeState::Opened,
        reason: req.reason,
        evidence: None,
        merchant_id: merchant_id.to_string(),
        correlation_id: correlation_id.to_string(),
        created_at: now,
        updated_at: now,
    };

    let snapshot = serde_json::to_value(&dispute).unwrap_or(Value::Null);
    state
        .ledger
        .write_entry(
            "dispute.opened",
            &dispute.id,
            dispute.amount,
            &payments
                .get(&req.payment_id)
                .map(|p| p.currency.clone())
                .unwrap_or_default(),
            merchant_id,
            None,
            correlation_id,
            snapshot.clone(),
        )
        .await
        .map_err(store_err)?;
    save_dispute(state, &dispute).await?;
    state
        .ledger
        .emit_outbox_event("dispute.opened", snapshot, correlation_id)
        .await
        .map_err(store_err)?;

    Ok(dispute)
}

pub async fn submit_evidence(
    state: &AppState,
    dispute_id: &str,
    evidence: String,
    merchant_id: &str,
    correlation_id: &str,
) -> Result<Dispute, CoreError> {
    let mut dispute = get_dispute(state, dispute_id).await?;
    payrail_types::state_machine::validate_dispute_transition(
        dispute.state,
        DisputeState::UnderReview,
    )?;

    dispute.state = DisputeState::UnderReview;
    dispute.evidence = Some(evidence);
    dispute.updated_at = Utc::now();

    let currency = get_payment(state, &dispute.payment_id)
        .await
        .map(|p| p.currency)
        .unwrap_or_default();
    let snapshot = serde_json::to_value(&dispute).unwrap_or(Value::Null);
    state
        .ledger
        .write_entry(
            "dispute.under_review",
            dispute_id,
            dispute.amount,
            &currency,
            merchant_id,
            None,
            correlation_id,
            snapshot.clone(),
        )
        .await
        .map_err(store_err)?;
    save_dispute(state, &dispute).await?;
    state
        .ledger
        .emit_outbox_event("dispute.under_review", snapshot, correlation_id)
        .await
        .map_err(store_err)?;

    Ok(dispute)
}

pub async fn resolve_dispute(
    state: &AppState,
    dispute_id: &str,
    req: ResolveDisputeRequest,
    merchant_id: &str,
    correlation_id: &str,
) -> Result<Dispute, CoreError> {
    let mut dispute = get_dispute(state, dispute_id).await?;
    let target = match req.outcome.as_str() {
        "won" => DisputeState::Won,
        "lost" => DisputeState::Lost,
        other => {
            return Err(CoreError::InvalidRequest {
                message: format!("unknown dispute outcome: {other}"),
            })
        }
    };
    payrail_types::state_machine::validate_dispute_transition(dispute.state, target)?;

    dispute.state = target;
    dispute.updated_at = Utc::now();

    let currency = get_payment(state, &dispute.payment_id)
        .await
        .map(|p| p.currency)
        .unwrap_or_default();
    let event_type = format!("dispute.{}", target.as_str());
    let snapshot = serde_json::to_value(&dispute).unwrap_or(Value::Null);
    state
        .ledger
        .write_entry(
            &event_type,
            dispute_id,
            dispute.amount,
            &currency,
            merchant_id,
            None,
            correlation_id,
            snapshot.clone(),
        )
        .await
        .map_err(store_err)?;
    save_dispute(state, &dispute).await?;
    state
        .ledger
        .emit_outbox_event(&event_type, snapshot, correlation_id)
        .await
        .map_err(store_err)?;

    Ok(dispute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

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

    async fn seed_payment(state: &AppState, id: &str, payment_state: PaymentState) -> PaymentIntent {
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
            provider_ref: Some("prv_1".to_string()),
            decline_reason: None,
            idempotency_key: String::new(),
            correlation_id: "corr_seed".to_string(),
            created_at: now,
            updated_at: now,
            metadata: BTreeMap::new(),
            state: payment_state,
        };
        save_payment(state, &payment).await.unwrap();
        payment
    }

    #[tokio::test]
    async fn opening_dispute_against_captured_payment_triggers_chargeback() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        seed_payment(&state, "pi_1", PaymentState::Captured).await;

        let dispute = create_dispute(
            &state,
            CreateDisputeRequest {
                payment_id: "pi_1".to_string(),
                amount: 500,
                reason: "fraud".to_string(),
            },
            "m_001",
            "corr_1",
        )
        .await
        .unwrap();

        assert_eq!(dispute.state, DisputeState::Opened);
        let payment = get_payment(&state, "pi_1").await.unwrap();
        assert_eq!(payment.state, PaymentState::Chargeback);
    }

    #[tokio::test]
    async fn opening_dispute_against_unknown_payment_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let err = create_dispute(
            &state,
            CreateDisputeRequest {
                payment_id: "pi_missing".to_string(),
                amount: 500,
                reason: "fraud".to_string(),
            },
            "m_001",
            "corr_1",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: "payment", .. }));
    }

    #[tokio::test]
    async fn submit_evidence_moves_dispute_to_under_review() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        seed_payment(&state, "pi_1", PaymentState::Captured).await;
        let dispute = create_dispute(
            &state,
            CreateDisputeRequest {
                payment_id: "pi_1".to_string(),
                amount: 500,
                reason: "fraud".to_string(),
            },
            "m_001",
            "corr_1",
        )
        .await
        .unwrap();

        let updated = submit_evidence(&state, &dispute.id, "receipt attached".to_string(), "m_001", "corr_2")
            .await
            .unwrap();
        assert_eq!(updated.state, DisputeState::UnderReview);
        assert_eq!(updated.evidence.as_deref(), Some("receipt attached"));
    }

    #[tokio::test]
    async fn resolve_dispute_rejects_unknown_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        seed_payment(&state, "pi_1", PaymentState::Captured).await;
        let dispute = create_dispute(
            &state,
            CreateDisputeRequest {
                payment_id: "pi_1".to_string(),
                amount: 500,
                reason: "fraud".to_string(),
            },
            "m_001",
            "corr_1",
        )
        .await
        .unwrap();

        let err = resolve_dispute(
            &state,
            &dispute.id,
            ResolveDisputeRequest {
                outcome: "maybe".to_string(),
            },
            "corr_2",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn resolve_dispute_won_transitions_terminal_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        seed_payment(&state, "pi_1", PaymentState::Captured).await;
        let dispute = create_dispute(
            &state,
            CreateDisputeRequest {
                payment_id: "pi_1".to_string(),
                amount: 500,
                reason: "fraud".to_string(),
            },
            "m_001",
            "corr_1",
        )
        .await
        .unwrap();
        submit_evidence(&state, &dispute.id, "receipt attached".to_string(), "m_001", "corr_2")
            .await
            .unwrap();

        let resolved = resolve_dispute(
            &state,
            &dispute.id,
            ResolveDisputeRequest {
                outcome: "won".to_string(),
            },
            "corr_3",
        )
        .await
        .unwrap();
        assert_eq!(resolved.state, DisputeState::Won);
    }

    #[tokio::test]
    async fn list_disputes_filters_by_merchant() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        seed_payment(&state, "pi_1", PaymentState::Captured).await;
        create_dispute(
            &state,
            CreateDisputeRequest {
                payment_id: "pi_1".to_string(),
                amount: 500,
                reason: "fraud".to_string(),
            },
            "m_001",
            "corr_1",
        )
        .await
        .unwrap();

        let (items, total) = list_disputes(&state, None, Some("m_001"), 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items.len(), 1);

        let (other, other_total) = list_disputes(&state, None, Some("m_002"), 10, 0).await.unwrap();
        assert_eq!(other_total, 0);
        assert!(other.is_empty());
    }
}
