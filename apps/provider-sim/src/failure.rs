//! Fault injection knobs, grounded on `provider_sim/failure_injection.py`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureConfig {
    pub timeout_rate: f64,
    pub decline_rate: f64,
    pub error_rate: f64,
    pub duplicate_webhook_rate: f64,
    pub settlement_mismatch_rate: f64,
    pub latency_ms_min: u64,
    pub latency_ms_max: u64,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            timeout_rate: 0.0,
            decline_rate: 0.05,
            error_rate: 0.0,
            duplicate_webhook_rate: 0.0,
            settlement_mismatch_rate: 0.0,
            latency_ms_min: 100,
            latency_ms_max: 300,
        }
    }
}

/// Per-provider defaults, mirroring `PROVIDER_PROFILES`.
pub fn default_profile(provider_id: &str) -> FailureConfig {
    match provider_id {
        "providerA" => FailureConfig {
            decline_rate: 0.05,
            latency_ms_min: 100,
            latency_ms_max: 300,
            ..FailureConfig::default()
        },
        "providerB" => FailureConfig {
            decline_rate: 0.10,
            latency_ms_min: 200,
            latency_ms_max: 500,
            ..FailureConfig::default()
        },
        _ => FailureConfig::default(),
    }
}

/// Decline reason vocabulary per provider, mirroring `DECLINE_REASONS`.
pub fn decline_reasons(provider_id: &str) -> &'static [&'static str] {
    match provider_id {
        "providerA" => &["insufficient_funds", "card_declined", "expired_card", "processing_error"],
        "providerB" => &["DECLINED", "FRAUD", "EXPIRED", "DO_NOT_HONOR"],
        _ => &["declined"],
    }
}
