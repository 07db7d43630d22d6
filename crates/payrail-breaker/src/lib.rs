//! Per-provider circuit breaker. Grounded on `services/circuit_breaker.py`:
//! same closed/open/half_open transition rules, same default tunables
//! (failure_threshold=5, recovery_timeout_s=30, half_open_max_calls=3), one
//! state file per provider under `providers/<id>_state.json`.

use chrono::Utc;
use payrail_store::FileDurableStore;
use payrail_types::{BreakerState, CircuitBreakerState};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_s: i64,
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_s: 30,
            half_open_max_calls: 3,
        }
    }
}

pub struct CircuitBreaker {
    store: Arc<FileDurableStore>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(store: Arc<FileDurableStore>, config: BreakerConfig) -> Self {
        Self { store, config }
    }

    fn state_key(provider_id: &str) -> String {
        format!("providers/{provider_id}_state.json")
    }

    async fn read_state(&self, provider_id: &str) -> CircuitBreakerState {
        let state: Option<CircuitBreakerState> = self
            .store
            .read_json(&Self::state_key(provider_id))
            .await
            .unwrap_or(None);
        state.unwrap_or_else(|| CircuitBreakerState::new(provider_id))
    }

    async fn write_state(&self, state: &CircuitBreakerState) {
        let _ = self.store.write_json(&Self::state_key(&state.provider_id), state).await;
    }

    pub async fn get_state(&self, provider_id: &str) -> CircuitBreakerState {
        self.read_state(provider_id).await
    }

    /// Transitions open→half_open if the recovery timeout has elapsed, then
    /// reports whether a call may proceed. Performed under the store's
    /// per-key lock for the full read-decide-write critical section.
    pub async fn can_execute(&self, provider_id: &str) -> bool {
        let mut state = self.read_state(provider_id).await;
        match state.circuit_state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => state.half_open_calls < self.config.half_open_max_calls,
            BreakerState::Open => {
                let elapsed = state
                    .opened_at
                    .map(|opened_at| (Utc::now() - opened_at).num_seconds())
                    .unwrap_or(i64::MAX);
                if elapsed > self.config.recovery_timeout_s {
                    state.circuit_state = BreakerState::HalfOpen;
                    state.half_open_calls = 0;
                    self.write_state(&state).await;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self, provider_id: &str) {
        let mut state = self.read_state(provider_id).await;
        state.total_requests += 1;
        state.success_count += 1;
        state.last_success_at = Some(Utc::now());

        match state.circuit_state {
            BreakerState::Closed => {}
            BreakerState::HalfOpen => {
                state.half_open_calls += 1;
                if state.half_open_calls >= self.config.half_open_max_calls {
                    state.circuit_state = BreakerState::Closed;
                    state.failure_count = 0;
                    state.opened_at = None;
                    state.half_open_calls = 0;
                }
            }
            BreakerState::Open => {}
        }
        self.write_state(&state).await;
    }

    pub async fn record_failure(&self, provider_id: &str) {
        let mut state = self.read_state(provider_id).await;
        state.total_requests += 1;
        state.failure_count += 1;
        state.last_failure_at = Some(Utc::now());

        match state.circuit_state {
            BreakerState::Closed => {
                if state.failure_count >= self.config.failure_threshold {
                    state.circuit_state = BreakerState::Open;
                    state.opened_at = Some(Utc::now());
                }
            }
            BreakerState::HalfOpen => {
                state.circuit_state = BreakerState::Open;
                state.opened_at = Some(Utc::now());
                state.half_open_calls = 0;
            }
            BreakerState::Open => {}
        }
        self.write_state(&state).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileDurableStore::new(dir.path()));
        let breaker = CircuitBreaker::new(store, BreakerConfig::default());

        for _ in 0..5 {
            assert!(breaker.can_execute("providerA").await);
            breaker.record_failure("providerA").await;
        }
        assert!(!breaker.can_execute("providerA").await);
        let state = breaker.get_state("providerA").await;
        assert_eq!(state.circuit_state.as_str(), "open");
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileDurableStore::new(dir.path()));
        let breaker = CircuitBreaker::new(
            store,
            BreakerConfig {
                failure_threshold: 1,
                recovery_timeout_s: -1,
                half_open_max_calls: 3,
            },
        );

        breaker.record_failure("providerA").await;
        assert!(breaker.can_execute("providerA").await);
        let state = breaker.get_state("providerA").await;
        assert_eq!(state.circuit_state.as_str(), "half_open");

        breaker.record_failure("providerA").await;
        let state = breaker.get_state("providerA").await;
        assert_eq!(state.circuit_state.as_str(), "open");
    }

    #[tokio::test]
    async fn half_open_success_streak_closes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileDurableStore::new(dir.path()));
        let breaker = CircuitBreaker::new(
            store,
            BreakerConfig {
                failure_threshold: 1,
                recovery_timeout_s: -1,
                half_open_max_calls: 2,
            },
        );

        breaker.record_failure("providerA").await;
        breaker.can_execute("providerA").await;
        breaker.record_success("providerA").await;
        breaker.record_success("providerA").await;

        let state = breaker.get_state("providerA").await;
        assert_eq!(state.circuit_state.as_str(), "closed");
        assert_eq!(state.failure_count, 0);
    }
}
