//! HMAC-SHA256 signing for the webhook contract, used by the outbox
//! dispatcher (outbound) and the webhook ingress (inbound). Implemented in
//! `payrail-provider` since the provider simulator's callback sender signs
//! with the same scheme; re-exported here under the name the rest of this
//! crate already expects.

pub use payrail_provider::signing::{sign_payload, verify_signature};
