//! Diffs ledger totals against the settlement CSV for a date and writes a
//! report. Grounded on `ledger_jobs/reconciliation.py`: last ledger entry
//! per `ref` wins (a plain loop-assignment into a map), matched against
//! settlement CSV totals keyed by `payment_id`.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use payrail_types::LedgerEntry;
use serde::Serialize;

use crate::state::AppState;

const LEDGER_STREAM: &str = "ledger/payments.jsonl";

fn settlement_key(date: &str) -> String {
    format!("settlement/settlement_{date}.csv")
}

fn report_key(date: &str) -> String {
    format!("reconciliation/reconciliation_report_{date}.json")
}

#[derive(Debug, Serialize)]
struct Mismatch {
    payment_id: String,
    ledger_amount: Option<i64>,
    settlement_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diff: Option<i64>,
    issue: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReconciliationReport {
    pub date: String,
    pub status: &'static str,
    pub total_ledger: i64,
    pub total_settlement: i64,
    pub diff: i64,
    pub matched: usize,
    pub mismatched: usize,
    pub missing_from_settlement: usize,
    pub missing_from_ledger: usize,
    mismatches: Vec<Mismatch>,
    pub generated_at: chrono::DateTime<Utc>,
}

pub async fn reconcile(state: &AppState, date: &str) -> Option<ReconciliationReport> {
    let entries: Vec<LedgerEntry> = match state.store.read_jsonl(LEDGER_STREAM).await {
        Ok(entries) => entries,
        Err(source) => {
            tracing::error!(error = %source, "failed to read ledger for reconciliation");
            return None;
        }
    };

    let mut ledger_amounts: BTreeMap<String, i64> = BTreeMap::new();
    for entry in entries
        .iter()
        .filter(|e| e.entry_type == "payment.captured" || e.entry_type == "payment.settled")
    {
        ledger_amounts.insert(entry.ref_id.clone(), entry.amount);
    }

    let settlement_rows = match state.store.read_csv(&settlement_key(date)).await {
        Ok(rows) => rows,
        Err(source) => {
            tracing::error!(error = %source, date, "failed to read settlement csv for reconciliation");
            return None;
        }
    };
    let mut settlement_amounts: BTreeMap<String, i64> = BTreeMap::new();
    for row in settlement_rows {
        let payment_id = row.get("payment_id").cloned().unwrap_or_default();
        let amount: i64 = row.get("amount").and_then(|v| v.parse().ok()).unwrap_or(0);
        settlement_amounts.insert(payment_id, amount);
    }

    let mut all_ids: Vec<&String> = ledger_amounts.keys().chain(settlement_amounts.keys()).collect();
    all_ids.sort();
    all_ids.dedup();

    let mut matched = 0usize;
    let mut mismatched = 0usize;
    let mut missing_from_settlement = 0usize;
    let mut missing_from_ledger = 0usize;
    let mut mismatches = Vec::new();

    for payment_id in all_ids {
        let ledger_amt = ledger_amounts.get(payment_id).copied();
        let settle_amt = settlement_amounts.get(payment_id).copied();

        match (ledger_amt, settle_amt) {
            (None, settle_amt) => {
                missing_from_ledger += 1;
                mismatches.push(Mismatch {
                    payment_id: payment_id.clone(),
                    ledger_amount: None,
                    settlement_amount: settle_amt,
                    diff: None,
                    issue: "missing_from_ledger",
                });
            }
            (ledger_amt, None) => {
                missing_from_settlement += 1;
                mismatches.push(Mismatch {
                    payment_id: payment_id.clone(),
                    ledger_amount: ledger_amt,
                    settlement_amount: None,
                    diff: None,
                    issue: "missing_from_settlement",
                });
            }
            (Some(ledger_amt), Some(settle_amt)) if ledger_amt != settle_amt => {
                mismatched += 1;
                mismatches.push(Mismatch {
                    payment_id: payment_id.clone(),
                    ledger_amount: Some(ledger_amt),
                    settlement_amount: Some(settle_amt),
                    diff: Some(ledger_amt - settle_amt),
                    issue: "amount_mismatch",
                });
            }
            _ => matched += 1,
        }
    }

    let total_ledger: i64 = ledger_amounts.values().sum();
    let total_settlement: i64 = settlement_amounts.values().sum();
    let status = if mismatches.is_empty() { "clean" } else { "mismatches_found" };

    let report = ReconciliationReport {
        date: date.to_string(),
        status,
        total_ledger,
        total_settlement,
        diff: total_ledger - total_settlement,
        matched,
        mismatched,
        missing_from_settlement,
        missing_from_ledger,
        mismatches,
        generated_at: Utc::now(),
    };

    if let Err(source) = state.store.write_json(&report_key(date), &report).await {
        tracing::error!(error = %source, date, "failed to write reconciliation report");
        return None;
    }

    tracing::info!(
        date,
        matched,
        mismatched,
        missing_from_settlement,
        missing_from_ledger,
        "reconciliation complete"
    );
    Some(report)
}

pub async fn run_loop(state: AppState, interval_s: u64) {
    tracing::info!(interval_s, "reconciliation job started");
    loop {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        reconcile(&state, &today).await;
        tokio::time::sleep(Duration::from_secs(interval_s)).await;
    }
}
