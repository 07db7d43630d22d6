//! Refund lifecycle. `approve_refund` enforces maker-checker: the approver
//! must differ from the original requester, per `routers/refunds.py`.

use std::collections::BTreeMap;

use chrono::Utc;
use payrail_provider::RefundRequest;
use payrail_types::{new_refund_id, CoreError, Refund, RefundState};
use serde::Deserialize;
use serde_json::Value;

use crate::payments::{get_payment, store_err};
use crate::state::AppState;

const REFUNDS_STORE: &str = "idempotency/refunds_store.json";

#[derive(Debug, Deserialize)]
pub struct CreateRefundRequest {
    pub payment_id: String,
    pub amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

async fn load_refunds(state: &AppState) -> Result<BTreeMap<String, Refund>, CoreError> {
    state.store.read_json(REFUNDS_STORE).await.map_err(store_err)
}

async fn save_refund(state: &AppState, refund: &Refund) -> Result<(), CoreError> {
    let mut refunds = load_refunds(state).await?;
    refunds.insert(refund.id.clone(), refund.clone());
    state
        .store
        .write_json(REFUNDS_STORE, &refunds)
        .await
        .map_err(store_err)
}

pub async fn get_refund(state: &AppState, refund_id: &str) -> Result<Refund, CoreError> {
    let refunds = load_refunds(state).await?;
    refunds.get(refund_id).cloned().ok_or_else(|| CoreError::NotFound {
        entity: "refund",
        id: refund_id.to_string(),
    })
}

pub async fn list_refunds(
    state: &AppState,
    filter_state: Option<&str>,
    merchant_id: Option<&str>,
    limit: usize,
    offset: usize,
) -> Result<(Vec<Refund>, usize), CoreError> {
    let refunds = load_refunds(state).await?;
    let mut items: Vec<Refund> = refunds.into_values().collect();
    if let Some(filter_state) = filter_state {
        items.retain(|r| r.state.as_str() == filter_state);
    }
    if let Some(merchant_id) = merchant_id {
        items.retain(|r| r.merchant_id == merchant_id);
    }
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let total = items.len();
    let page = items.into_iter().skip(offset).take(limit).collect();
    Ok((page, total))
}

pub async fn create_refund(
    state: &AppState,
    req: CreateRefundRequest,
    merchant_id: &str,
    requested_by: &str,
    correlation_id: &str,
) -> Result<Refund, CoreError> {
    let payment = get_payment(state, &req.payment_id).await?;
    if !matches!(
        payment.state,
        payrail_types::PaymentState::Captured | payrail_types::PaymentState::Settled
    ) {
        return Err(CoreError::InvalidRequest {
            message: "only captured or settled payments can be refunded".to_string(),
        });
    }

    let now = Utc::now();
    let mut refund = Refund {
        id: new_refund_id(),
        payment_id: req.payment_id.clone(),
        amount: req.amount,
        currency: payment.currency.clone(),
        reason: req.reason,
        requested_by: requested_by.to_string(),
        approved_by: None,
        merchant_id: merchant_id.to_string(),
        state: RefundState::Created,
        correlation_id: correlation_id.to_string(),
        created_at: now,
        updated_at: now,
        metadata: BTreeMap::new(),
    };

    payrail_types::state_machine::validate_refund_transition(
        RefundState::Created,
        RefundState::PendingApproval,
    )?;
    refund.state = RefundState::PendingApproval;
    refund.updated_at = Utc::now();

    let snapshot = serde_json::to_value(&refund).unwrap_or(Value::Null);
    state
        .ledger
        .write_entry(
            "refund.created",
            &refund.id,
            refund.amount,
            &refund.currency,
            merchant_id,
            payment.provider.as_deref(),
            correlation_id,
            snapshot.clone(),
        )
        .await
        .map_err(store_err)?;
    save_refund(state, &refund).await?;
    state
        .ledger
        .emit_outbox_event("refund.created", snapshot, correlation_id)
        .await
        .map_err(store_err)?;

    Ok(refund)
}

pub async fn approve_refund(
    state: &AppState,
    refund_id: &str,
    approved_by: &str,
    correlation_id: &str,
) -> Result<Refund, CoreError> {
    let mut refund = get_refund(state, refund_id).await?;
    payrail_types::state_machine::validate_refund_transition(refund.state, RefundState::Approved)?;

    if approved_by == refund.requested_by {
        return Err(CoreError::MakerCheckerViolation);
    }

    let payment = get_payment(state, &refund.payment_id).await?;
    let provider_id = payment.provider.clone().ok_or_else(|| CoreError::InvalidRequest {
        message: "payment has no associated provider".to_string(),
    })?;
    let provider_ref = payment
        .provider_ref
        .clone()
        .ok_or_else(|| CoreError::InvalidRequest {
            message: "payment has no provider reference".to_string(),
        })?;

    refund.state = RefundState::Approved;
    refund.approved_by = Some(approved_by.to_string());
    refund.updated_at = Utc::now();

    let result = state
        .provider_client
        .refund(
            &provider_id,
            RefundRequest {
                payment_id: &refund.payment_id,
                provider_ref: &provider_ref,
                amount: refund.amount,
            },
        )
        .await;

    let event_type = match result {
        Ok(result) if result.success => {
            payrail_types::state_machine::validate_refund_transition(
                refund.state,
                RefundState::Succeeded,
            )?;
            refund.state = RefundState::Succeeded;
            "refund.succeeded"
        }
        _ => {
            payrail_types::state_machine::validate_refund_transition(refund.state, RefundState::Failed)?;
            refund.state = RefundState::Failed;
            "refund.failed"
        }
    };
    refund.updated_at = Utc::now();

    let snapshot = serde_json::to_value(&refund).unwrap_or(Value::Null);
    state
        .ledger
        .write_entry(
            event_type,
            refund_id,
            refund.amount,
            &refund.currency,
            &refund.merchant_id,
            Some(&provider_id),
            correlation_id,
            snapshot.clone(),
        )
        .await
        .map_err(store_err)?;
    save_refund(state, &refund).await?;
    state
        .ledger
        .emit_outbox_event(event_type, snapshot, correlation_id)
        .await
        .map_err(store_err)?;

    Ok(refund)
}

pub async fn reject_refund(
    state: &AppState,
    refund_id: &str,
    rejected_by: &str,
    correlation_id: &str,
) -> Result<Refund, CoreError> {
    let mut refund = get_refund(state, refund_id).await?;
    payrail_types::state_machine::validate_refund_transition(refund.state, RefundState::Failed)?;

    if rejected_by == refund.requested_by {
        return Err(CoreError::MakerCheckerViolation);
    }

    refund.state = RefundState::Failed;
    refund.updated_at = Utc::now();

    let snapshot = serde_json::to_value(&refund).unwrap_or(Value::Null);
    state
        .ledger
        .write_entry(
            "refund.rejected",
            refund_id,
            refund.amount,
            &refund.currency,
            &refund.merchant_id,
            None,
            correlation_id,
            snapshot.clone(),
        )
        .await
        .map_err(store_err)?;
    save_refund(state, &refund).await?;
    state
        .ledger
        .emit_outbox_event("refund.rejected", snapshot, correlation_id)
        .await
        .map_err(store_err)?;

    Ok(refund)
}
