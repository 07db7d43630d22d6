//! Append-only event log, partitioned into three streams by entity family.
//! Grounded on `services/ledger.py`: `write_entry` routes by the `type`
//! prefix, `get_entries_for_ref` scans all three streams and sorts by
//! timestamp, `get_all_entries` returns newest-first with pagination, and
//! `emit_outbox_event` appends to the outbox stream alongside.

use chrono::Utc;
use payrail_store::{FileDurableStore, StoreError};
use payrail_types::{new_ledger_entry_id, new_outbox_event_id, LedgerEntry, OutboxEvent};
use serde_json::Value;
use std::sync::Arc;

const PAYMENTS_STREAM: &str = "ledger/payments.jsonl";
const REFUNDS_STREAM: &str = "ledger/refunds.jsonl";
const DISPUTES_STREAM: &str = "ledger/disputes.jsonl";
const OUTBOX_STREAM: &str = "outbox/events.jsonl";

pub struct Ledger {
    store: Arc<FileDurableStore>,
}

impl Ledger {
    pub fn new(store: Arc<FileDurableStore>) -> Self {
        Self { store }
    }

    fn stream_for_type(entry_type: &str) -> &'static str {
        if entry_type.starts_with("refund.") {
            REFUNDS_STREAM
        } else if entry_type.starts_with("dispute.") {
            DISPUTES_STREAM
        } else {
            PAYMENTS_STREAM
        }
    }

    fn stream_for_family(family: &str) -> &'static str {
        match family {
            "refund" => REFUNDS_STREAM,
            "dispute" => DISPUTES_STREAM,
            _ => PAYMENTS_STREAM,
        }
    }

    /// Builds and appends a ledger entry. Callers supply everything but
    /// `id`/`timestamp`, which the ledger stamps itself.
    #[allow(clippy::too_many_arguments)]
    pub async fn write_entry(
        &self,
        entry_type: &str,
        ref_id: &str,
        amount: i64,
        currency: &str,
        merchant_id: &str,
        provider: Option<&str>,
        correlation_id: &str,
        metadata: Value,
    ) -> Result<LedgerEntry, StoreError> {
        let entry = LedgerEntry {
            id: new_ledger_entry_id(),
            entry_type: entry_type.to_string(),
            ref_id: ref_id.to_string(),
            amount,
            currency: currency.to_string(),
            merchant_id: merchant_id.to_string(),
            provider: provider.map(str::to_string),
            correlation_id: correlation_id.to_string(),
            timestamp: Utc::now(),
            metadata,
        };
        self.store
            .append_jsonl(Self::stream_for_type(entry_type), &entry)
            .await?;
        Ok(entry)
    }

    pub async fn get_entries_for_ref(&self, ref_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut all = Vec::new();
        for stream in [PAYMENTS_STREAM, REFUNDS_STREAM, DISPUTES_STREAM] {
            let entries: Vec<LedgerEntry> = self.store.read_jsonl(stream).await?;
            all.extend(entries.into_iter().filter(|e| e.ref_id == ref_id));
        }
        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(all)
    }

    /// Newest-first page of a single family's stream.
    pub async fn get_all_entries(
        &self,
        family: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<LedgerEntry>, usize), StoreError> {
        let mut entries: Vec<LedgerEntry> = self.store.read_jsonl(Self::stream_for_family(family)).await?;
        let total = entries.len();
        entries.reverse();
        let page = entries.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    pub async fn emit_outbox_event(
        &self,
        event_type: &str,
        payload: Value,
        correlation_id: &str,
    ) -> Result<OutboxEvent, StoreError> {
        let event = OutboxEvent {
            id: new_outbox_event_id(),
            event_type: event_type.to_string(),
            payload,
            correlation_id: correlation_id.to_string(),
            created_at: Utc::now(),
        };
        self.store.append_jsonl(OUTBOX_STREAM, &event).await?;
        Ok(event)
    }
}
