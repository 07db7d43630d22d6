mod audit;
mod disputes;
mod health;
mod headers;
mod payments;
mod refunds;
mod webhooks;

use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::metrics::record_request_metrics;
use crate::state::AppState;
use std::time::Duration;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/providers/health", get(health::provider_health))
        .route("/metrics", get(health::metrics))
        .route("/ledger/:ref_id", get(health::ledger_entries))
        .route(
            "/payment-intents",
            post(payments::create).get(payments::list),
        )
        .route("/payment-intents/:payment_id", get(payments::get))
        .route("/payment-intents/:payment_id/authorize", post(payments::authorize))
        .route("/payment-intents/:payment_id/capture", post(payments::capture))
        .route("/payment-intents/:payment_id/cancel", post(payments::cancel))
        .route("/refunds", post(refunds::create).get(refunds::list))
        .route("/refunds/:refund_id", get(refunds::get))
        .route("/refunds/:refund_id/approve", post(refunds::approve))
        .route("/refunds/:refund_id/reject", post(refunds::reject))
        .route("/disputes", post(disputes::create).get(disputes::list))
        .route("/disputes/:dispute_id", get(disputes::get))
        .route(
            "/disputes/:dispute_id/submit-evidence",
            post(disputes::submit_evidence_handler),
        )
        .route("/disputes/:dispute_id/resolve", post(disputes::resolve))
        .route("/webhooks/provider", post(webhooks::receive))
        .route("/audit/payments", get(audit::payments))
        .route("/audit/refunds", get(audit::refunds))
        .route("/audit/disputes", get(audit::disputes))
        .route("/audit/vault-access", get(audit::vault_access))
        .route("/audit/export", get(audit::export))
        .route("/audit/reconciliation", get(audit::reconciliation))
        .route("/audit/settlements", get(audit::settlements))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            record_request_metrics,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}
