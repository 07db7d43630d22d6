//! Payment intent lifecycle. Grounded on `routers/payments.py`: every
//! write path is idempotency check → state validation → external side
//! effect (if any) → ledger append → snapshot write → outbox append, in
//! that order, matching the ledger-first discipline in §4.8/§5.

use std::collections::BTreeMap;

use chrono::Utc;
use payrail_provider::{AuthorizeRequest, CaptureRequest};
use payrail_types::{new_payment_id, CoreError, PaymentIntent, PaymentState};
use serde::Deserialize;
use serde_json::Value;

use crate::state::AppState;

const PAYMENTS_STORE: &str = "idempotency/payments_store.json";

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizePaymentRequest {
    #[serde(default)]
    pub pan: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
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

pub async fn get_payment(state: &AppState, payment_id: &str) -> Result<PaymentIntent, CoreError> {
    let payments = load_payments(state).await?;
    payments.get(payment_id).cloned().ok_or_else(|| CoreError::NotFound {
        entity: "payment",
        id: payment_id.to_string(),
    })
}

pub async fn list_payments(
    state: &AppState,
    filter_state: Option<&str>,
    merchant_id: Option<&str>,
    limit: usize,
    offset: usize,
) -> Result<(Vec<PaymentIntent>, usize), CoreError> {
    let payments = load_payments(state).await?;
    let mut items: Vec<PaymentIntent> = payments.into_values().collect();
    if let Some(filter_state) = filter_state {
        items.retain(|p| p.state.as_str() == filter_state);
    }
    if let Some(merchant_id) = merchant_id {
        items.retain(|p| p.merchant_id == merchant_id);
    }
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let total = items.len();
    let page = items.into_iter().skip(offset).take(limit).collect();
    Ok((page, total))
}

pub async fn create_payment(
    state: &AppState,
    req: CreatePaymentRequest,
    merchant_id: &str,
    correlation_id: &str,
) -> Result<PaymentIntent, CoreError> {
    let now = Utc::now();
    let payment = PaymentIntent {
        id: new_payment_id(),
        amount: req.amount,
        currency: req.currency,
        merchant_id: merchant_id.to_string(),
        customer_email: req.customer_email,
        description: req.description,
        provider: None,
        token: req.token,
        provider_ref: None,
        decline_reason: None,
        idempotency_key: String::new(),
        correlation_id: correlation_id.to_string(),
        created_at: now,
        updated_at: now,
        metadata: req.metadata,
        state: PaymentState::Created,
    };

    // Ledger-first: the event is durable before the snapshot becomes visible.
    let snapshot = serde_json::to_value(&payment).unwrap_or(Value::Null);
    state
        .ledger
        .write_entry(
            "payment.created",
            &payment.id,
            payment.amount,
            &payment.currency,
            merchant_id,
            None,
            correlation_id,
            snapshot.clone(),
        )
        .await
        .map_err(store_err)?;

    save_payment(state, &payment).await?;
    state
        .ledger
        .emit_outbox_event("payment.created", snapshot, correlation_id)
        .await
        .map_err(store_err)?;

    Ok(payment)
}

pub async fn authorize_payment(
    state: &AppState,
    payment_id: &str,
    req: AuthorizePaymentRequest,
    merchant_id: &str,
    correlation_id: &str,
) -> Result<PaymentIntent, CoreError> {
    let mut payment = get_payment(state, payment_id).await?;

    payrail_types::state_machine::validate_payment_transition(
        payment.state,
        PaymentState::Authorized,
    )?;

    let (pan, expiry, token) = if let (Some(pan), Some(expiry)) = (&req.pan, &req.expiry) {
        let outcome = state
            .vault
            .tokenize(pan, expiry, None, "api-gateway", "authorization", correlation_id)
            .await
            .map_err(|e| CoreError::InvalidRequest {
                message: e.to_string(),
            })?;
        (pan.clone(), expiry.clone(), outcome.token)
    } else if let Some(token) = req.token.clone().or_else(|| payment.token.clone()) {
        let charged = state
            .vault
            .charge_token(&token, "api-gateway", "authorization", correlation_id)
            .await
            .map_err(|e| CoreError::InvalidRequest {
                message: e.to_string(),
            })?;
        (charged.pan, charged.expiry, token)
    } else {
        return Err(CoreError::InvalidRequest {
            message: "either pan+expiry or token required".to_string(),
        });
    };

    let provider_id = state
        .routing_engine()
        .select_provider(payment.amount, &payment.currency, req.country.as_deref(), None)
        .await?;

    let authorize_req = AuthorizeRequest {
        payment_id,
        amount: payment.amount,
        currency: &payment.currency,
        pan: &pan,
        expiry: &expiry,
        merchant_id,
    };

    let (result, provider_id) = match state.provider_client.authorize(&provider_id, authorize_req).await {
        Ok(result) => (result, provider_id),
        Err(CoreError::ProviderUnavailable) => {
            let failover_id = if state.config.failover_provider == provider_id {
                state.config.default_provider.clone()
            } else {
                state.config.failover_provider.clone()
            };
            let result = state
                .provider_client
                .authorize(
                    &failover_id,
                    AuthorizeRequest {
                        payment_id,
                        amount: payment.amount,
                        currency: &payment.currency,
                        pan: &pan,
                        expiry: &expiry,
                        merchant_id,
                    },
                )
                .await?;
            (result, failover_id)
        }
        Err(other) => return Err(other),
    };

    let now = Utc::now();
    payment.token = Some(token);
    payment.provider = Some(provider_id.clone());
    payment.provider_ref = result.provider_ref.clone();
    payment.updated_at = now;

    let event_type = if result.success {
        payment.state = PaymentState::Authorized;
        "payment.authorized"
    } else {
        payment.state = PaymentState::Declined;
        payment.decline_reason = result.decline_reason.clone();
        "payment.declined"
    };

    let snapshot = serde_json::to_value(&payment).unwrap_or(Value::Null);
    state
        .ledger
        .write_entry(
            event_type,
            payment_id,
            payment.amount,
            &payment.currency,
            merchant_id,
            Some(&provider_id),
            correlation_id,
            snapshot.clone(),
        )
        .await
        .map_err(store_err)?;
    save_payment(state, &payment).await?;
    state
        .ledger
        .emit_outbox_event(event_type, snapshot, correlation_id)
        .await
        .map_err(store_err)?;

    Ok(payment)
}

pub async fn capture_payment(
    state: &AppState,
    payment_id: &str,
    merchant_id: &str,
    correlation_id: &str,
) -> Result<PaymentIntent, CoreError> {
    let mut payment = get_payment(state, payment_id).await?;
    payrail_types::state_machine::validate_payment_transition(payment.state, PaymentState::Captured)?;

    let provider_id = payment.provider.clone().ok_or_else(|| CoreError::InvalidRequest {
        message: "payment not yet authorized with a provider".to_string(),
    })?;
    let provider_ref = payment
        .provider_ref
        .clone()
        .ok_or_else(|| CoreError::InvalidRequest {
            message: "payment not yet authorized with a provider".to_string(),
        })?;

    state
        .provider_client
        .capture(
            &provider_id,
            CaptureRequest {
                payment_id,
                provider_ref: &provider_ref,
                amount: payment.amount,
            },
        )
        .await?;

    payment.state = PaymentState::Captured;
    payment.updated_at = Utc::now();

    let snapshot = serde_json::to_value(&payment).unwrap_or(Value::Null);
    state
        .ledger
        .write_entry(
            "payment.captured",
            payment_id,
            payment.amount,
            &payment.currency,
            merchant_id,
            Some(&provider_id),
            correlation_id,
            snapshot.clone(),
        )
        .await
        .map_err(store_err)?;
    save_payment(state, &payment).await?;
    state
        .ledger
        .emit_outbox_event("payment.captured", snapshot, correlation_id)
        .await
        .map_err(store_err)?;

    Ok(payment)
}

/// No provider RPC on cancel — preserved per source (see DESIGN.md open
/// question (a)).
pub async fn cancel_payment(
    state: &AppState,
    payment_id: &str,
    merchant_id: &str,
    correlation_id: &str,
) -> Result<PaymentIntent, CoreError> {
    let mut payment = get_payment(state, payment_id).await?;
    payrail_types::state_machine::validate_payment_transition(payment.state, PaymentState::Reversed)?;

    payment.state = PaymentState::Reversed;
    payment.updated_at = Utc::now();

    let snapshot = serde_json::to_value(&payment).unwrap_or(Value::Null);
    state
        .ledger
        .write_entry(
            "payment.reversed",
            payment_id,
            payment.amount,
            &payment.currency,
            merchant_id,
            payment.provider.as_deref(),
            correlation_id,
            snapshot.clone(),
        )
        .await
        .map_err(store_err)?;
    save_payment(state, &payment).await?;
    state
        .ledger
        .emit_outbox_event("payment.reversed", snapshot, correlation_id)
        .await
        .map_err(store_err)?;

    Ok(payment)
}

pub(crate) fn store_err(e: payrail_store::StoreError) -> CoreError {
    CoreError::Store {
        message: e.to_string(),
    }
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

    #[tokio::test]
    async fn create_payment_starts_in_created_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let payment = create_payment(
            &state,
            CreatePaymentRequest {
                amount: 1999,
                currency: "USD".to_string(),
                customer_email: None,
                description: None,
                token: None,
                metadata: BTreeMap::new(),
            },
            "m_001",
            "corr_1",
        )
        .await
        .unwrap();

        assert_eq!(payment.state, PaymentState::Created);
        assert_eq!(payment.amount, 1999);
        let fetched = get_payment(&state, &payment.id).await.unwrap();
        assert_eq!(fetched.id, payment.id);
    }

    #[tokio::test]
    async fn get_payment_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let err = get_payment(&state, "pi_missing").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: "payment", .. }));
    }

    #[tokio::test]
    async fn list_payments_filters_by_merchant_and_paginates() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        for (merchant, amount) in [("m_001", 100), ("m_001", 200), ("m_002", 300)] {
            create_payment(
                &state,
                CreatePaymentRequest {
                    amount,
                    currency: "USD".to_string(),
                    customer_email: None,
                    description: None,
                    token: None,
                    metadata: BTreeMap::new(),
                },
                merchant,
                "corr_1",
            )
            .await
            .unwrap();
        }

        let (items, total) = list_payments(&state, None, Some("m_001"), 10, 0).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(items.len(), 2);

        let (page, total_all) = list_payments(&state, None, None, 1, 0).await.unwrap();
        assert_eq!(total_all, 3);
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn capture_before_authorize_is_invalid_transition() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let payment = create_payment(
            &state,
            CreatePaymentRequest {
                amount: 500,
                currency: "USD".to_string(),
                customer_email: None,
                description: None,
                token: None,
                metadata: BTreeMap::new(),
            },
            "m_001",
            "corr_1",
        )
        .await
        .unwrap();

        let err = capture_payment(&state, &payment.id, "m_001", "corr_2")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn cancel_before_authorize_is_invalid_transition() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let payment = create_payment(
            &state,
            CreatePaymentRequest {
                amount: 500,
                currency: "USD".to_string(),
                customer_email: None,
                description: None,
                token: None,
                metadata: BTreeMap::new(),
            },
            "m_001",
            "corr_1",
        )
        .await
        .unwrap();

        let err = cancel_payment(&state, &payment.id, "m_001", "corr_2")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn authorize_without_pan_or_token_is_invalid_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let payment = create_payment(
            &state,
            CreatePaymentRequest {
                amount: 500,
                currency: "USD".to_string(),
                customer_email: None,
                description: None,
                token: None,
                metadata: BTreeMap::new(),
            },
            "m_001",
            "corr_1",
        )
        .await
        .unwrap();

        let err = authorize_payment(
            &state,
            &payment.id,
            AuthorizePaymentRequest {
                pan: None,
                expiry: None,
                token: None,
                country: None,
            },
            "m_001",
            "corr_2",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn authorize_against_unreachable_provider_surfaces_provider_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let payment = create_payment(
            &state,
            CreatePaymentRequest {
                amount: 500,
                currency: "USD".to_string(),
                customer_email: None,
                description: None,
                token: None,
                metadata: BTreeMap::new(),
            },
            "m_001",
            "corr_1",
        )
        .await
        .unwrap();

        let err = authorize_payment(
            &state,
            &payment.id,
            AuthorizePaymentRequest {
                pan: Some("4111111111111111".to_string()),
                expiry: Some("12/28".to_string()),
                token: None,
                country: None,
            },
            "m_001",
            "corr_2",
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::ProviderError { .. } | CoreError::ProviderTimeout | CoreError::ProviderUnavailable
        ));
    }
}
