//! Environment-driven configuration, in the teacher's `config.rs` shape:
//! one `DEFAULT_*` constant per tunable and a small family of `env_*`
//! parsing helpers rather than a config-parsing crate.

use std::env;

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_PROVIDER_SIM_URL: &str = "http://127.0.0.1:8028";
const DEFAULT_WEBHOOK_SECRET: &str = "whsec_payrail_demo_secret_key_2026";
const DEFAULT_WEBHOOK_CALLBACK_URL: &str = "http://127.0.0.1:8026/webhooks/provider";
const DEFAULT_DEFAULT_PROVIDER: &str = "providerA";
const DEFAULT_FAILOVER_PROVIDER: &str = "providerB";
const DEFAULT_CB_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_CB_RECOVERY_TIMEOUT_S: i64 = 30;
const DEFAULT_CB_HALF_OPEN_MAX_CALLS: u32 = 3;
const DEFAULT_OUTBOX_INTERVAL_S: u64 = 5;
const DEFAULT_SETTLEMENT_INTERVAL_S: u64 = 10;
const DEFAULT_RECONCILIATION_INTERVAL_S: u64 = 3600;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8026";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: String,
    pub provider_sim_url: String,
    pub webhook_secret: String,
    pub webhook_callback_url: String,
    pub default_provider: String,
    pub failover_provider: String,
    pub cb_failure_threshold: u32,
    pub cb_recovery_timeout_s: i64,
    pub cb_half_open_max_calls: u32,
    pub outbox_interval_s: u64,
    pub settlement_interval_s: u64,
    pub reconciliation_interval_s: u64,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            data_dir: env_or("DATA_DIR", DEFAULT_DATA_DIR),
            provider_sim_url: env_or("PROVIDER_SIM_URL", DEFAULT_PROVIDER_SIM_URL),
            webhook_secret: env_or("WEBHOOK_SECRET", DEFAULT_WEBHOOK_SECRET),
            webhook_callback_url: env_or("WEBHOOK_CALLBACK_URL", DEFAULT_WEBHOOK_CALLBACK_URL),
            default_provider: env_or("DEFAULT_PROVIDER", DEFAULT_DEFAULT_PROVIDER),
            failover_provider: env_or("FAILOVER_PROVIDER", DEFAULT_FAILOVER_PROVIDER),
            cb_failure_threshold: env_u32("CB_FAILURE_THRESHOLD", DEFAULT_CB_FAILURE_THRESHOLD),
            cb_recovery_timeout_s: env_i64("CB_RECOVERY_TIMEOUT", DEFAULT_CB_RECOVERY_TIMEOUT_S),
            cb_half_open_max_calls: env_u32("CB_HALF_OPEN_MAX_CALLS", DEFAULT_CB_HALF_OPEN_MAX_CALLS),
            outbox_interval_s: env_u64("OUTBOX_INTERVAL_S", DEFAULT_OUTBOX_INTERVAL_S),
            settlement_interval_s: env_u64("SETTLEMENT_INTERVAL_S", DEFAULT_SETTLEMENT_INTERVAL_S),
            reconciliation_interval_s: env_u64(
                "RECONCILIATION_INTERVAL_S",
                DEFAULT_RECONCILIATION_INTERVAL_S,
            ),
            bind_addr: env_or("BIND_ADDR", DEFAULT_BIND_ADDR),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
