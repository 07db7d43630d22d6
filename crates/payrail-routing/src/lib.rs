//! Provider selection by rule + breaker health. Grounded on
//! `services/routing.py`: preferred provider, then a fixed country table,
//! then an amount threshold, then configured default/failover, each gated
//! by `CircuitBreaker::can_execute`.

use payrail_breaker::CircuitBreaker;
use payrail_types::CoreError;

pub const HIGH_VALUE_THRESHOLD_MINOR_UNITS: i64 = 10_000;

fn country_route(country: &str) -> Option<&'static str> {
    match country {
        "DE" | "FR" | "GB" | "JP" => Some("providerB"),
        "US" | "CA" | "AU" => Some("providerA"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub default_provider: String,
    pub failover_provider: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_provider: "providerA".to_string(),
            failover_provider: "providerB".to_string(),
        }
    }
}

pub struct RoutingEngine<'a> {
    breaker: &'a CircuitBreaker,
    config: RoutingConfig,
}

impl<'a> RoutingEngine<'a> {
    pub fn new(breaker: &'a CircuitBreaker, config: RoutingConfig) -> Self {
        Self { breaker, config }
    }

    /// Evaluates candidate providers in rule order, returning the first
    /// one the breaker currently admits calls for.
    pub async fn select_provider(
        &self,
        amount: i64,
        _currency: &str,
        country: Option<&str>,
        preferred: Option<&str>,
    ) -> Result<String, CoreError> {
        let mut candidates: Vec<String> = Vec::new();

        if let Some(preferred) = preferred {
            candidates.push(preferred.to_string());
        }
        if let Some(country) = country {
            if let Some(provider) = country_route(country) {
                candidates.push(provider.to_string());
            }
        }
        if amount >= HIGH_VALUE_THRESHOLD_MINOR_UNITS {
            candidates.push("providerB".to_string());
        }
        candidates.push(self.config.default_provider.clone());
        candidates.push(self.config.failover_provider.clone());

        for candidate in candidates {
            if self.breaker.can_execute(&candidate).await {
                return Ok(candidate);
            }
        }

        Err(CoreError::ProviderUnavailable)
    }
}
