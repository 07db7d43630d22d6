//! Wires the HTTP surface, background jobs, and domain services together.
//! `apps/payrail-gateway` is a thin binary over this crate, the way the
//! teacher keeps its Axum app construction in a library crate consumed by
//! a small `main.rs`.

pub mod config;
pub mod correlation;
pub mod disputes;
pub mod error_response;
pub mod metrics;
pub mod outbox_dispatcher;
pub mod payments;
pub mod reconciliation;
pub mod refunds;
pub mod routes;
pub mod settlement;
pub mod signing;
pub mod state;
pub mod webhooks;

pub use config::Config;
pub use state::AppState;

use axum::Router;

pub fn router(state: AppState) -> Router {
    routes::build_router(state)
}

/// Spawns the outbox dispatcher, settlement generator, and reconciliation
/// job as independent background loops, each on the interval configured
/// for it.
pub fn spawn_background_jobs(state: AppState) {
    let outbox_state = state.clone();
    let outbox_interval = state.config.outbox_interval_s;
    tokio::spawn(async move {
        outbox_dispatcher::run_loop(outbox_state, outbox_interval).await;
    });

    let settlement_state = state.clone();
    let settlement_interval = state.config.settlement_interval_s;
    tokio::spawn(async move {
        settlement::run_loop(settlement_state, settlement_interval).await;
    });

    let reconciliation_state = state.clone();
    let reconciliation_interval = state.config.reconciliation_interval_s;
    tokio::spawn(async move {
        reconciliation::run_loop(reconciliation_state, reconciliation_interval).await;
    });
}
