//! At-least-once webhook delivery for ledger-derived events. Grounded on
//! `ledger_jobs/outbox_dispatcher.py`: each tick reads the outbox stream,
//! subtracts a persisted processed-set, and for every pending event
//! attempts delivery up to 3 times with {1,3,10}s backoff before moving
//! it to a dead-letter stream. The retry/backoff shape follows the
//! teacher's `try_publish_with_retry` loop in its publisher module.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use payrail_types::OutboxEvent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::signing::sign_payload;
use crate::state::AppState;

const OUTBOX_STREAM: &str = "outbox/events.jsonl";
const PROCESSED_KEY: &str = "outbox/processed_events.json";
const DLQ_STREAM: &str = "outbox/dlq.jsonl";
const RETRY_BACKOFF_S: [u64; 3] = [1, 3, 10];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProcessedRecord {
    processed_at: chrono::DateTime<Utc>,
    status: String,
}

async fn dispatch_event(state: &AppState, event: &OutboxEvent) -> bool {
    let payload = json!({
        "id": event.id,
        "type": event.event_type,
        "data": event.payload,
        "created_at": event.created_at,
    });
    let body = serde_json::to_vec(&payload).unwrap_or_default();
    let signature = sign_payload(&state.config.webhook_secret, &body);

    for (attempt, backoff_s) in RETRY_BACKOFF_S.iter().enumerate() {
        let result = reqwest::Client::new()
            .post(&state.config.webhook_callback_url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", &signature)
            .header("X-Correlation-Id", &event.correlation_id)
            .timeout(Duration::from_secs(10))
            .body(body.clone())
            .send()
            .await;

        match result {
            Ok(response) if response.status().as_u16() < 400 => return true,
            Ok(response) => {
                tracing::warn!(event_id = %event.id, status = %response.status(), attempt, "webhook delivery rejected");
            }
            Err(source) => {
                tracing::warn!(event_id = %event.id, error = %source, attempt, "webhook delivery failed");
            }
        }

        if attempt + 1 < RETRY_BACKOFF_S.len() {
            tokio::time::sleep(Duration::from_secs(*backoff_s)).await;
        }
    }

    false
}

pub async fn process_pending(state: &AppState) {
    let events: Vec<OutboxEvent> = match state.store.read_jsonl(OUTBOX_STREAM).await {
        Ok(events) => events,
        Err(source) => {
            tracing::error!(error = %source, "failed to read outbox stream");
            return;
        }
    };
    if events.is_empty() {
        return;
    }

    let mut processed: BTreeMap<String, ProcessedRecord> =
        match state.store.read_json(PROCESSED_KEY).await {
            Ok(processed) => processed,
            Err(source) => {
                tracing::error!(error = %source, "failed to read processed outbox set");
                return;
            }
        };

    let pending: Vec<&OutboxEvent> = events
        .iter()
        .filter(|e| !processed.contains_key(&e.id))
        .collect();
    if pending.is_empty() {
        return;
    }

    tracing::info!(count = pending.len(), "processing pending outbox events");

    for event in pending {
        let delivered = dispatch_event(state, event).await;
        if delivered {
            processed.insert(
                event.id.clone(),
                ProcessedRecord {
                    processed_at: Utc::now(),
                    status: "delivered".to_string(),
                },
            );
            tracing::info!(event_id = %event.id, "delivered outbox event");
        } else {
            let mut dlq_record: Value = serde_json::to_value(event).unwrap_or(Value::Null);
            if let Value::Object(map) = &mut dlq_record {
                map.insert("dlq_reason".to_string(), json!("max_retries_exceeded"));
                map.insert("dlq_at".to_string(), json!(Utc::now()));
            }
            let _ = state.store.append_jsonl(DLQ_STREAM, &dlq_record).await;
            processed.insert(
                event.id.clone(),
                ProcessedRecord {
                    processed_at: Utc::now(),
                    status: "dlq".to_string(),
                },
            );
            tracing::warn!(event_id = %event.id, "moved outbox event to dead-letter queue");
        }
    }

    if let Err(source) = state.store.write_json(PROCESSED_KEY, &processed).await {
        tracing::error!(error = %source, "failed to persist processed outbox set");
    }
}

pub async fn run_loop(state: AppState, interval_s: u64) {
    tracing::info!(interval_s, "outbox dispatcher started");
    loop {
        process_pending(&state).await;
        tokio::time::sleep(Duration::from_secs(interval_s)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::routing::post;
    use axum::{Json, Router};
    use payrail_types::OutboxEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn test_state(dir: &std::path::Path, webhook_callback_url: String) -> AppState {
        AppState::new(Config {
            data_dir: dir.to_string_lossy().to_string(),
            provider_sim_url: "http://127.0.0.1:9".to_string(),
            webhook_secret: "whsec_test".to_string(),
            webhook_callback_url,
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

    fn sample_event(id: &str) -> OutboxEvent {
        OutboxEvent {
            id: id.to_string(),
            event_type: "payment.authorized".to_string(),
            payload: json!({ "payment_id": "pi_1" }),
            correlation_id: "corr_1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn undeliverable_event_ends_up_in_dead_letter_queue() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "http://127.0.0.1:9/webhooks/provider".to_string());
        state
            .store
            .append_jsonl(OUTBOX_STREAM, &sample_event("evt_1"))
            .await
            .unwrap();

        process_pending(&state).await;

        let processed: BTreeMap<String, ProcessedRecord> =
            state.store.read_json(PROCESSED_KEY).await.unwrap();
        assert_eq!(processed.get("evt_1").map(|r| r.status.as_str()), Some("dlq"));

        let dlq: Vec<Value> = state.store.read_jsonl(DLQ_STREAM).await.unwrap();
        assert_eq!(dlq.len(), 1);
    }

    #[tokio::test]
    async fn delivered_event_is_marked_processed_and_not_reprocessed() {
        let received = Arc::new(AtomicUsize::new(0));
        let app_received = received.clone();
        let app = Router::new().route(
            "/hook",
            post(move |Json(_body): Json<Value>| {
                let received = app_received.clone();
                async move {
                    received.fetch_add(1, Ordering::SeqCst);
                    axum::http::StatusCode::OK
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), format!("http://{addr}/hook"));
        state
            .store
            .append_jsonl(OUTBOX_STREAM, &sample_event("evt_1"))
            .await
            .unwrap();

        process_pending(&state).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);

        let processed: BTreeMap<String, ProcessedRecord> =
            state.store.read_json(PROCESSED_KEY).await.unwrap();
        assert_eq!(processed.get("evt_1").map(|r| r.status.as_str()), Some("delivered"));

        // A second tick must skip the already-processed event.
        process_pending(&state).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
