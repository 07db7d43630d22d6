use std::sync::Arc;

use payrail_breaker::{BreakerConfig, CircuitBreaker};
use payrail_idempotency::IdempotencyService;
use payrail_ledger::Ledger;
use payrail_provider::ProviderClient;
use payrail_routing::RoutingConfig;
use payrail_store::FileDurableStore;
use payrail_vault::Vault;

use crate::config::Config;

/// Shared service handles. Every handler clones this (cheap: everything
/// inside is an `Arc`) the way `lightning-wallet-executor`'s `AppState`
/// wraps its service handles for `axum::extract::State`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<FileDurableStore>,
    pub ledger: Arc<Ledger>,
    pub breaker: Arc<CircuitBreaker>,
    pub provider_client: Arc<ProviderClient>,
    pub vault: Arc<Vault>,
    pub idempotency_payments: Arc<IdempotencyService>,
    pub idempotency_refunds: Arc<IdempotencyService>,
    pub idempotency_disputes: Arc<IdempotencyService>,
    pub routing_config: Arc<RoutingConfig>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(FileDurableStore::new(config.data_dir.clone()));
        let ledger = Arc::new(Ledger::new(store.clone()));
        let breaker = Arc::new(CircuitBreaker::new(
            store.clone(),
            BreakerConfig {
                failure_threshold: config.cb_failure_threshold,
                recovery_timeout_s: config.cb_recovery_timeout_s,
                half_open_max_calls: config.cb_half_open_max_calls,
            },
        ));
        let provider_client = Arc::new(ProviderClient::new(
            config.provider_sim_url.clone(),
            breaker.clone(),
        ));
        let vault = Arc::new(Vault::new(store.clone()));
        let routing_config = Arc::new(RoutingConfig {
            default_provider: config.default_provider.clone(),
            failover_provider: config.failover_provider.clone(),
        });

        Self {
            idempotency_payments: Arc::new(IdempotencyService::new(store.clone(), "payments")),
            idempotency_refunds: Arc::new(IdempotencyService::new(store.clone(), "refunds")),
            idempotency_disputes: Arc::new(IdempotencyService::new(store.clone(), "disputes")),
            config,
            store,
            ledger,
            breaker,
            provider_client,
            vault,
            routing_config,
        }
    }

    pub fn routing_engine(&self) -> payrail_routing::RoutingEngine<'_> {
        payrail_routing::RoutingEngine::new(&self.breaker, (*self.routing_config).clone())
    }
}
