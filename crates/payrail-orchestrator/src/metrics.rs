//! Request metrics middleware. Grounded on `shared/middleware.py`'s
//! per-request logging: appends one JSONL record per request carrying
//! method, path, status, duration, and correlation id.

use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::correlation::correlation_id_from_headers;
use crate::state::AppState;

const METRICS_STREAM: &str = "metrics/service_metrics.jsonl";

#[derive(Debug, Serialize, Deserialize)]
struct RequestMetric {
    timestamp: chrono::DateTime<Utc>,
    method: String,
    path: String,
    status_code: u16,
    duration_ms: u128,
    correlation_id: String,
}

pub async fn record_request_metrics(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let correlation_id = correlation_id_from_headers(request.headers());
    let start = Instant::now();

    let response = next.run(request).await;

    let metric = RequestMetric {
        timestamp: Utc::now(),
        method,
        path,
        status_code: response.status().as_u16(),
        duration_ms: start.elapsed().as_millis(),
        correlation_id,
    };
    if let Err(source) = state.store.append_jsonl(METRICS_STREAM, &metric).await {
        tracing::warn!(error = %source, "failed to append request metric");
    }

    response
}
