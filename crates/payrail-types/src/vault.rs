use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRecord {
    pub token: String,
    pub encrypted_pan: String,
    pub bin: String,
    pub last_four: String,
    pub expiry: String,
    pub card_brand: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardholder_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultAccessLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub token: String,
    pub requester: String,
    pub purpose: String,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultKeyRing {
    /// Keys ordered newest-first; index 0 is the active encryption key.
    pub keys: Vec<VaultKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultKey {
    pub key_id: String,
    /// Base64 (URL-safe, no padding) encoded 32-byte ChaCha20-Poly1305 key.
    pub key_b64: String,
    pub created_at: DateTime<Utc>,
}

impl VaultKeyRing {
    pub fn active(&self) -> Option<&VaultKey> {
        self.keys.first()
    }

    pub fn find(&self, key_id: &str) -> Option<&VaultKey> {
        self.keys.iter().find(|k| k.key_id == key_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> VaultKey {
        VaultKey {
            key_id: id.to_string(),
            key_b64: "zzzz".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn active_is_the_first_key() {
        let ring = VaultKeyRing {
            keys: vec![key("k2"), key("k1")],
        };
        assert_eq!(ring.active().unwrap().key_id, "k2");
    }

    #[test]
    fn find_looks_up_by_id_regardless_of_position() {
        let ring = VaultKeyRing {
            keys: vec![key("k2"), key("k1")],
        };
        assert_eq!(ring.find("k1").unwrap().key_id, "k1");
        assert!(ring.find("missing").is_none());
    }

    #[test]
    fn active_on_empty_ring_is_none() {
        let ring = VaultKeyRing { keys: vec![] };
        assert!(ring.active().is_none());
    }
}
