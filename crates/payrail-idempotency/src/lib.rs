//! Key → (body-hash, cached response, TTL) deduplication. Grounded on
//! `services/idempotency.py`: the hash is over a canonical JSON encoding so
//! that key ordering in the caller's request body never affects the hash,
//! and a second call with the same key but a different hash fails closed
//! rather than silently returning the first response. The canonicalize-
//! then-hash idiom mirrors the teacher's `neobank::receipts::canonical_sha256`.

use chrono::{Duration, Utc};
use payrail_store::{FileDurableStore, StoreError};
use payrail_types::{CoreError, IdempotencyRecord};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

const TTL_HOURS: i64 = 24;

/// Serializes `value` with object keys sorted at every level, then hashes
/// the result with SHA-256. Arrays and scalars are hashed in their natural
/// `serde_json` order (arrays are already order-significant).
pub fn canonical_sha256(value: &Value) -> String {
    let canonical = canonicalize(value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn canonicalize(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let parts: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), canonicalize(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

pub struct IdempotencyService {
    store: Arc<FileDurableStore>,
    key_space: &'static str,
}

impl IdempotencyService {
    /// `key_space` scopes the store key per route tag (e.g. `payments`,
    /// `refunds`, `disputes`) since the idempotency key space is otherwise
    /// global per process.
    pub fn new(store: Arc<FileDurableStore>, key_space: &'static str) -> Self {
        Self { store, key_space }
    }

    fn store_key(&self) -> String {
        format!("idempotency/{}_store.json", self.key_space)
    }

    pub fn compute_hash(&self, body: &Value) -> String {
        canonical_sha256(body)
    }

    /// Returns the cached `(response, status_code)` on hash match, `None`
    /// on an unseen key or an expired (>24h) record, and fails with
    /// `IdempotencyConflict` when the key is known but the hash differs.
    pub async fn check(
        &self,
        key: &str,
        request_hash: &str,
    ) -> Result<Option<(Value, u16)>, CoreError> {
        let records: BTreeMap<String, IdempotencyRecord> = self
            .store
            .read_json(&self.store_key())
            .await
            .map_err(store_err)?;

        let Some(record) = records.get(key) else {
            return Ok(None);
        };

        if Utc::now() - record.created_at > Duration::hours(TTL_HOURS) {
            return Ok(None);
        }

        if record.request_hash != request_hash {
            return Err(CoreError::IdempotencyConflict {
                key: key.to_string(),
            });
        }

        Ok(Some((record.response.clone(), record.status_code)))
    }

    pub async fn store(
        &self,
        key: &str,
        request_hash: &str,
        response: Value,
        status_code: u16,
    ) -> Result<(), CoreError> {
        let mut records: BTreeMap<String, IdempotencyRecord> = self
            .store
            .read_json(&self.store_key())
            .await
            .map_err(store_err)?;
        records.insert(
            key.to_string(),
            IdempotencyRecord {
                request_hash: request_hash.to_string(),
                response,
                status_code,
                created_at: Utc::now(),
            },
        );
        self.store
            .write_json(&self.store_key(), &records)
            .await
            .map_err(store_err)
    }
}

fn store_err(e: StoreError) -> CoreError {
    CoreError::Store {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_hash_is_order_independent() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_sha256(&a), canonical_sha256(&b));
    }

    #[tokio::test]
    async fn replay_returns_cached_response() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileDurableStore::new(dir.path()));
        let svc = IdempotencyService::new(store, "payments");

        let body = json!({"amount": 1999, "currency": "USD"});
        let hash = svc.compute_hash(&body);
        assert!(svc.check("idem-1", &hash).await.unwrap().is_none());

        svc.store("idem-1", &hash, json!({"id": "pi_1"}), 201)
            .await
            .unwrap();

        let cached = svc.check("idem-1", &hash).await.unwrap();
        assert_eq!(cached, Some((json!({"id": "pi_1"}), 201)));
    }

    #[tokio::test]
    async fn mismatched_body_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileDurableStore::new(dir.path()));
        let svc = IdempotencyService::new(store, "payments");

        let first = svc.compute_hash(&json!({"amount": 1999}));
        svc.store("idem-2", &first, json!({"id": "pi_2"}), 201)
            .await
            .unwrap();

        let second = svc.compute_hash(&json!({"amount": 2000}));
        let result = svc.check("idem-2", &second).await;
        assert!(matches!(result, Err(CoreError::IdempotencyConflict { .. })));
    }
}
