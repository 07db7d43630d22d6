//! Promotes captured payments to settled and emits a daily settlement CSV.
//! Grounded on `ledger_jobs/settlement_generator.py`. Promotion runs over
//! *all* not-yet-settled captured payments regardless of capture date; the
//! CSV for a given date only includes ledger entries whose timestamp falls
//! on that date — the asymmetry is intentional, see DESIGN.md.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::Utc;
use payrail_types::{LedgerEntry, PaymentIntent, PaymentState};
use serde_json::Value;

use crate::state::AppState;

const LEDGER_STREAM: &str = "ledger/payments.jsonl";
const PAYMENTS_STORE: &str = "idempotency/payments_store.json";
const CSV_HEADERS: [&str; 7] = [
    "payment_id",
    "provider_ref",
    "amount",
    "currency",
    "type",
    "status",
    "settled_at",
];

fn settlement_key(date: &str) -> String {
    format!("settlement/settlement_{date}.csv")
}

pub async fn generate(state: &AppState, date: &str) -> usize {
    let entries: Vec<LedgerEntry> = match state.store.read_jsonl(LEDGER_STREAM).await {
        Ok(entries) => entries,
        Err(source) => {
            tracing::error!(error = %source, "failed to read ledger for settlement");
            return 0;
        }
    };
    let mut payments: BTreeMap<String, PaymentIntent> = match state.store.read_json(PAYMENTS_STORE).await
    {
        Ok(payments) => payments,
        Err(source) => {
            tracing::error!(error = %source, "failed to read payments store for settlement");
            return 0;
        }
    };

    let settled_refs: BTreeSet<&str> = entries
        .iter()
        .filter(|e| e.entry_type == "payment.settled")
        .map(|e| e.ref_id.as_str())
        .collect();

    let mut dirty = false;
    for entry in entries
        .iter()
        .filter(|e| e.entry_type == "payment.captured" || e.entry_type == "payment.settled")
    {
        let Some(payment) = payments.get_mut(&entry.ref_id) else {
            continue;
        };
        if payment.state == PaymentState::Captured && !settled_refs.contains(entry.ref_id.as_str()) {
            payment.state = PaymentState::Settled;
            payment.updated_at = Utc::now();
            dirty = true;

            let snapshot = serde_json::to_value(&*payment).unwrap_or(Value::Null);
            if let Err(source) = state
                .ledger
                .write_entry(
                    "payment.settled",
                    &entry.ref_id,
                    entry.amount,
                    &entry.currency,
                    &payment.merchant_id,
                    entry.provider.as_deref(),
                    "corr_settlement_job",
                    snapshot.clone(),
                )
                .await
            {
                tracing::error!(error = %source, ref_id = %entry.ref_id, "failed to append settlement ledger entry");
                continue;
            }
            if let Err(source) = state
                .ledger
                .emit_outbox_event("payment.settled", snapshot, "corr_settlement_job")
                .await
            {
                tracing::error!(error = %source, ref_id = %entry.ref_id, "failed to emit settlement outbox event");
            }
        }
    }

    if dirty {
        if let Err(source) = state.store.write_json(PAYMENTS_STORE, &payments).await {
            tracing::error!(error = %source, "failed to persist settled payments");
        }
    }

    let mut rows = Vec::new();
    let mut seen = BTreeSet::new();
    for entry in entries
        .iter()
        .filter(|e| e.entry_type == "payment.captured" || e.entry_type == "payment.settled")
    {
        if !entry.timestamp.format("%Y-%m-%d").to_string().eq(date) {
            continue;
        }
        if !seen.insert(entry.ref_id.clone()) {
            continue;
        }
        let provider_ref = entry
            .metadata
            .get("provider_ref")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        rows.push(vec![
            entry.ref_id.clone(),
            provider_ref,
            entry.amount.to_string(),
            entry.currency.clone(),
            entry.entry_type.clone(),
            "settled".to_string(),
            entry.timestamp.to_rfc3339(),
        ]);
    }

    if rows.is_empty() {
        tracing::info!(date, "no settled payments for date");
        return 0;
    }

    let count = rows.len();
    if let Err(source) = state
        .store
        .write_csv(&settlement_key(date), &CSV_HEADERS, &rows)
        .await
    {
        tracing::error!(error = %source, date, "failed to write settlement csv");
        return 0;
    }
    tracing::info!(date, rows = count, "generated settlement csv");
    count
}

pub async fn run_loop(state: AppState, interval_s: u64) {
    tracing::info!(interval_s, "settlement generator started");
    loop {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        generate(&state, &today).await;
        tokio::time::sleep(Duration::from_secs(interval_s)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use payrail_types::new_ledger_entry_id;

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

    fn payment(id: &str, state_value: PaymentState) -> PaymentIntent {
        let now = Utc::now();
        PaymentIntent {
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
            correlation_id: "corr_1".to_string(),
            created_at: now,
            updated_at: now,
            metadata: BTreeMap::new(),
            state: state_value,
        }
    }

    async fn seed(state: &AppState, payment_intent: &PaymentIntent, timestamp: chrono::DateTime<Utc>) {
        let mut payments: BTreeMap<String, PaymentIntent> =
            state.store.read_json(PAYMENTS_STORE).await.unwrap();
        payments.insert(payment_intent.id.clone(), payment_intent.clone());
        state.store.write_json(PAYMENTS_STORE, &payments).await.unwrap();

        let entry = LedgerEntry {
            id: new_ledger_entry_id(),
            entry_type: "payment.captured".to_string(),
            ref_id: payment_intent.id.clone(),
            amount: payment_intent.amount,
            currency: payment_intent.currency.clone(),
            merchant_id: payment_intent.merchant_id.clone(),
            provider: payment_intent.provider.clone(),
            correlation_id: "corr_1".to_string(),
            timestamp,
            metadata: serde_json::to_value(payment_intent).unwrap(),
        };
        state.store.append_jsonl(LEDGER_STREAM, &entry).await.unwrap();
    }

    #[tokio::test]
    async fn promotes_captured_payment_to_settled() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let pi = payment("pi_1", PaymentState::Captured);
        seed(&state, &pi, Utc::now()).await;

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let rows = generate(&state, &today).await;
        assert_eq!(rows, 1);

        let payments: BTreeMap<String, PaymentIntent> =
            state.store.read_json(PAYMENTS_STORE).await.unwrap();
        assert_eq!(payments.get("pi_1").unwrap().state, PaymentState::Settled);

        let settled_entries: Vec<LedgerEntry> = state.store.read_jsonl(LEDGER_STREAM).await.unwrap();
        assert!(settled_entries.iter().any(|e| e.entry_type == "payment.settled"));
    }

    #[tokio::test]
    async fn already_settled_payment_is_not_reprocessed() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let pi = payment("pi_1", PaymentState::Settled);
        seed(&state, &pi, Utc::now()).await;

        let today = Utc::now().format("%Y-%m-%d").to_string();
        generate(&state, &today).await;

        let entries: Vec<LedgerEntry> = state.store.read_jsonl(LEDGER_STREAM).await.unwrap();
        assert!(!entries.iter().any(|e| e.entry_type == "payment.settled"));
    }

    #[tokio::test]
    async fn csv_only_includes_entries_on_requested_date() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let pi = payment("pi_1", PaymentState::Captured);
        let yesterday = Utc::now() - chrono::Duration::days(1);
        seed(&state, &pi, yesterday).await;

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let rows = generate(&state, &today).await;
        assert_eq!(rows, 0);
    }
}
