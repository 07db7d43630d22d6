//! Environment-driven configuration, same `DEFAULT_*`/`env_*` shape as
//! `payrail-orchestrator::config`.

use std::env;

const DEFAULT_DATA_DIR: &str = "./data-provider-sim";
const DEFAULT_WEBHOOK_SECRET: &str = "whsec_payrail_demo_secret_key_2026";
const DEFAULT_WEBHOOK_CALLBACK_URL: &str = "http://127.0.0.1:8026/webhooks/provider";
const DEFAULT_SEED: u64 = 42;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8028";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: String,
    pub webhook_secret: String,
    pub webhook_callback_url: String,
    pub seed: u64,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            data_dir: env_or("DATA_DIR", DEFAULT_DATA_DIR),
            webhook_secret: env_or("WEBHOOK_SECRET", DEFAULT_WEBHOOK_SECRET),
            webhook_callback_url: env_or("WEBHOOK_CALLBACK_URL", DEFAULT_WEBHOOK_CALLBACK_URL),
            seed: env_u64("SEED", DEFAULT_SEED),
            bind_addr: env_or("BIND_ADDR", DEFAULT_BIND_ADDR),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
