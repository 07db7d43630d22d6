//! Shared data model and transition tables for the payment orchestration core.

pub mod error;
pub mod ids;
pub mod ledger;
pub mod payment;
pub mod refund;
pub mod dispute;
pub mod idempotency;
pub mod breaker;
pub mod vault;
pub mod state_machine;

pub use breaker::{BreakerState, CircuitBreakerState};
pub use dispute::{Dispute, DisputeState};
pub use error::CoreError;
pub use idempotency::IdempotencyRecord;
pub use ids::*;
pub use ledger::{LedgerEntry, OutboxEvent};
pub use payment::{PaymentIntent, PaymentState};
pub use refund::{Refund, RefundState};
pub use vault::{VaultAccessLogEntry, VaultKey, VaultKeyRing, VaultRecord};
