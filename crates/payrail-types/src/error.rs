use thiserror::Error;

/// Error kinds shared across the orchestration core, mapped to HTTP status
/// codes at the Axum boundary in `payrail-orchestrator`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("idempotency key {key} already used with a different request body")]
    IdempotencyConflict { key: String },

    #[error("invalid {entity} transition: {current} -> {target}")]
    InvalidTransition {
        entity: &'static str,
        current: String,
        target: String,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("no providers available")]
    ProviderUnavailable,

    #[error("provider request timed out")]
    ProviderTimeout,

    #[error("provider error: {message}")]
    ProviderError { message: String },

    #[error("maker-checker violation: approver must differ from requester")]
    MakerCheckerViolation,

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("store operation failed: {message}")]
    Store { message: String },
}
