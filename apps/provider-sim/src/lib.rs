//! Fault-injecting RPC simulator for `authorize`/`capture`/`refund`, plus
//! an admin endpoint to tune fault injection and a webhook callback
//! sender. Grounded on `provider_sim/main.py` + `failure_injection.py`.
//!
//! Kept as a library over a thin `main.rs`, the same split
//! `payrail-orchestrator`/`apps/payrail-gateway` use, so integration tests
//! elsewhere in the workspace can start a provider simulator in-process.

pub mod config;
pub mod failure;
pub mod routes;
pub mod simulate;
pub mod state;

pub use config::Config;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/providers/:provider_id/authorize", post(routes::authorize))
        .route("/providers/:provider_id/capture", post(routes::capture))
        .route("/providers/:provider_id/refund", post(routes::refund))
        .route(
            "/admin/providers/:provider_id/config",
            get(routes::get_config).put(routes::set_config),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
