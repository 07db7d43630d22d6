//! Tokenization vault: envelope-encrypted PAN storage with key rotation.
//!
//! The envelope format (`enc:v1:<key_id>:<nonce_b64>:<ciphertext_b64>`,
//! `ChaCha20Poly1305`, URL-safe base64 without padding) is the teacher's
//! `encrypt_integration_secret`/`decrypt_integration_secret` pattern from
//! `domain_store.rs`. The key-rotation contract — a new key is prepended,
//! older keys stay resolvable by id so existing ciphertexts never need
//! re-encryption — mirrors `shared/crypto.py`'s `MultiFernet` rotation,
//! translated from Fernet onto the teacher's actual AEAD.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chrono::Utc;
use payrail_store::FileDurableStore;
use payrail_types::{new_vault_token, VaultAccessLogEntry, VaultKey, VaultKeyRing, VaultRecord};
use rand::RngCore;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

const KEYS_KEY: &str = "vault/keys.json";
const TOKENS_KEY: &str = "vault/tokens.json";
const ACCESS_LOG_KEY: &str = "vault/access_log.jsonl";

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("pan length must be between 13 and 19 digits")]
    InvalidPanLength,
    #[error("token {0} not found")]
    TokenNotFound(String),
    #[error("vault has no active encryption key")]
    NoActiveKey,
    #[error("malformed envelope")]
    MalformedEnvelope,
    #[error("unknown key id {0} referenced by envelope")]
    UnknownKeyId(String),
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("store error: {0}")]
    Store(#[from] payrail_store::StoreError),
}

pub struct Vault {
    store: Arc<FileDurableStore>,
}

pub struct TokenizeOutcome {
    pub token: String,
    pub bin: String,
    pub last_four: String,
    pub card_brand: String,
}

pub struct ChargeTokenOutcome {
    pub pan: String,
    pub expiry: String,
}

impl Vault {
    pub fn new(store: Arc<FileDurableStore>) -> Self {
        Self { store }
    }

    async fn key_ring(&self) -> Result<VaultKeyRing, VaultError> {
        Ok(self.store.read_json(KEYS_KEY).await?)
    }

    /// Generates the first signing key if the vault has never been used.
    async fn ensure_key_ring(&self) -> Result<VaultKeyRing, VaultError> {
        let ring = self.key_ring().await?;
        if ring.keys.is_empty() {
            let ring = VaultKeyRing {
                keys: vec![generate_key()],
            };
            self.store.write_json(KEYS_KEY, &ring).await?;
            Ok(ring)
        } else {
            Ok(ring)
        }
    }

    pub async fn rotate_keys(&self) -> Result<String, VaultError> {
        let mut ring = self.ensure_key_ring().await?;
        let new_key = generate_key();
        let key_id = new_key.key_id.clone();
        ring.keys.insert(0, new_key);
        self.store.write_json(KEYS_KEY, &ring).await?;
        Ok(key_id)
    }

    async fn tokens(&self) -> Result<BTreeMap<String, VaultRecord>, VaultError> {
        Ok(self.store.read_json(TOKENS_KEY).await?)
    }

    async fn log_access(&self, action: &str, token: &str, requester: &str, purpose: &str, correlation_id: &str) {
        let _ = self
            .store
            .append_jsonl(
                ACCESS_LOG_KEY,
                &VaultAccessLogEntry {
                    timestamp: Utc::now(),
                    action: action.to_string(),
                    token: token.to_string(),
                    requester: requester.to_string(),
                    purpose: purpose.to_string(),
                    correlation_id: correlation_id.to_string(),
                },
            )
            .await;
    }

    pub async fn tokenize(
        &self,
        pan: &str,
        expiry: &str,
        cardholder_name: Option<&str>,
        requester: &str,
        purpose: &str,
        correlation_id: &str,
    ) -> Result<TokenizeOutcome, VaultError> {
        if !(13..=19).contains(&pan.len()) || !pan.chars().all(|c| c.is_ascii_digit()) {
            return Err(VaultError::InvalidPanLength);
        }

        let ring = self.ensure_key_ring().await?;
        let active = ring.keys.first().ok_or(VaultError::NoActiveKey)?;
        let encrypted_pan = encrypt(active, pan)?;

        let token = new_vault_token();
        let bin = pan[..pan.len().min(6)].to_string();
        let last_four = pan[pan.len() - 4..].to_string();
        let card_brand = detect_brand(pan);

        let mut tokens = self.tokens().await?;
        tokens.insert(
            token.clone(),
            VaultRecord {
                token: token.clone(),
                encrypted_pan,
                bin: bin.clone(),
                last_four: last_four.clone(),
                expiry: expiry.to_string(),
                card_brand: card_brand.clone(),
                cardholder_name: cardholder_name.map(str::to_string),
                created_at: Utc::now(),
            },
        );
        self.store.write_json(TOKENS_KEY, &tokens).await?;
        self.log_access("tokenize", &token, requester, purpose, correlation_id).await;

        Ok(TokenizeOutcome {
            token,
            bin,
            last_four,
            card_brand,
        })
    }

    /// Returns metadata only; the PAN itself is never returned.
    pub async fn detokenize(
        &self,
        token: &str,
        requester: &str,
        purpose: &str,
        correlation_id: &str,
    ) -> Result<VaultRecord, VaultError> {
        let tokens = self.tokens().await?;
        let record = tokens
            .get(token)
            .cloned()
            .ok_or_else(|| VaultError::TokenNotFound(token.to_string()))?;
        self.log_access("detokenize", token, requester, purpose, correlation_id).await;
        Ok(record)
    }

    /// Decrypts and returns the PAN for immediate submission to a provider.
    pub async fn charge_token(
        &self,
        token: &str,
        requester: &str,
        purpose: &str,
        correlation_id: &str,
    ) -> Result<ChargeTokenOutcome, VaultError> {
        let tokens = self.tokens().await?;
        let record = tokens
            .get(token)
            .cloned()
            .ok_or_else(|| VaultError::TokenNotFound(token.to_string()))?;
        let ring = self.key_ring().await?;
        let pan = decrypt(&ring, &record.encrypted_pan)?;
        self.log_access("charge_token", token, requester, purpose, correlation_id).await;
        Ok(ChargeTokenOutcome {
            pan,
            expiry: record.expiry,
        })
    }
}

fn generate_key() -> VaultKey {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    VaultKey {
        key_id: Uuid::new_v4().simple().to_string(),
        key_b64: URL_SAFE_NO_PAD.encode(bytes),
        created_at: Utc::now(),
    }
}

fn encrypt(key: &VaultKey, plaintext: &str) -> Result<String, VaultError> {
    let key_bytes = URL_SAFE_NO_PAD
        .decode(&key.key_b64)
        .map_err(|_| VaultError::DecryptionFailed)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));

    let mut nonce_bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| VaultError::DecryptionFailed)?;

    Ok(format!(
        "enc:v1:{}:{}:{}",
        key.key_id,
        URL_SAFE_NO_PAD.encode(nonce_bytes),
        URL_SAFE_NO_PAD.encode(ciphertext)
    ))
}

fn decrypt(ring: &VaultKeyRing, envelope: &str) -> Result<String, VaultError> {
    let mut parts = envelope.splitn(5, ':');
    let (Some("enc"), Some("v1"), Some(key_id), Some(nonce_b64), Some(ciphertext_b64)) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(VaultError::MalformedEnvelope);
    };

    let key = ring
        .find(key_id)
        .ok_or_else(|| VaultError::UnknownKeyId(key_id.to_string()))?;
    let key_bytes = URL_SAFE_NO_PAD
        .decode(&key.key_b64)
        .map_err(|_| VaultError::DecryptionFailed)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));

    let nonce_bytes = URL_SAFE_NO_PAD
        .decode(nonce_b64)
        .map_err(|_| VaultError::MalformedEnvelope)?;
    let ciphertext = URL_SAFE_NO_PAD
        .decode(ciphertext_b64)
        .map_err(|_| VaultError::MalformedEnvelope)?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|_| VaultError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed)
}

fn detect_brand(pan: &str) -> String {
    if pan.starts_with("37") {
        "amex".to_string()
    } else if pan.starts_with('4') {
        "visa".to_string()
    } else if pan.starts_with('5') {
        "mastercard".to_string()
    } else if pan.starts_with('6') {
        "discover".to_string()
    } else {
        "unknown".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_preserves_last_four_and_pan() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileDurableStore::new(dir.path()));
        let vault = Vault::new(store);

        let outcome = vault
            .tokenize("4111111111111111", "12/28", None, "api-gateway", "authorization", "corr_1")
            .await
            .unwrap();
        assert_eq!(outcome.last_four, "1111");
        assert_eq!(outcome.card_brand, "visa");

        let meta = vault
            .detokenize(&outcome.token, "api-gateway", "authorization", "corr_1")
            .await
            .unwrap();
        assert_eq!(meta.last_four, "1111");

        let charged = vault
            .charge_token(&outcome.token, "api-gateway", "authorization", "corr_1")
            .await
            .unwrap();
        assert_eq!(charged.pan, "4111111111111111");
    }

    #[tokio::test]
    async fn rotation_preserves_decryptability_of_existing_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileDurableStore::new(dir.path()));
        let vault = Vault::new(store);

        let outcome = vault
            .tokenize("5500000000000004", "01/29", None, "api-gateway", "authorization", "corr_1")
            .await
            .unwrap();

        vault.rotate_keys().await.unwrap();

        let charged = vault
            .charge_token(&outcome.token, "api-gateway", "authorization", "corr_1")
            .await
            .unwrap();
        assert_eq!(charged.pan, "5500000000000004");
    }

    #[tokio::test]
    async fn rejects_invalid_pan_length() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileDurableStore::new(dir.path()));
        let vault = Vault::new(store);

        let result = vault
            .tokenize("123", "12/28", None, "api-gateway", "authorization", "corr_1")
            .await;
        assert!(matches!(result, Err(VaultError::InvalidPanLength)));
    }
}
