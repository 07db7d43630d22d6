//! HMAC-SHA256 signing for the webhook contract shared by the gateway's
//! outbox dispatcher/webhook ingress and the provider simulator's callback
//! sender. Kept in this crate since both sides of that contract live here.
//! Follows the teacher's `khala_token.rs` signing path and
//! `lightning-wallet-executor/src/http.rs`'s `constant_time_eq`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Produces `sha256=<hex>` over `payload` using `secret`.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap_or_else(|_| {
        HmacSha256::new_from_slice(&[0u8; 32]).expect("zero-length key is always valid for HMAC")
    });
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Validates `signature` (`sha256=<hex>`) against `payload` in constant time.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let expected = sign_payload(secret, payload);
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(left: &str, right: &str) -> bool {
    let left = left.as_bytes();
    let right = right.as_bytes();
    if left.len() != right.len() {
        return false;
    }
    let mut diff = 0u8;
    for (a, b) in left.iter().zip(right.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}
