//! HTTP client for the provider RPC contract (authorize/capture/refund).
//! Grounded on `services/provider_client.py`: each call checks
//! `breaker.can_execute` first, issues a 10s-timeout POST, records
//! success/failure in the breaker based on both transport outcome and the
//! provider's `success` flag, and distinguishes `ProviderUnavailable`
//! (breaker open) from `ProviderTimeout`/`ProviderError` (the RPC itself
//! failed). The `reqwest::Client` + explicit `timeout()` idiom follows the
//! teacher's HTTP client construction in its wallet-executor and neobank
//! rails clients.

pub mod signing;

use std::sync::Arc;
use std::time::Duration;

use payrail_breaker::CircuitBreaker;
use payrail_types::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeRequest<'a> {
    pub payment_id: &'a str,
    pub amount: i64,
    pub currency: &'a str,
    pub pan: &'a str,
    pub expiry: &'a str,
    pub merchant_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureRequest<'a> {
    pub payment_id: &'a str,
    pub provider_ref: &'a str,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest<'a> {
    pub payment_id: &'a str,
    pub provider_ref: &'a str,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    pub success: bool,
    #[serde(default)]
    pub provider_ref: Option<String>,
    #[serde(default)]
    pub decline_reason: Option<String>,
    #[serde(default)]
    pub extra: Option<Value>,
}

pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
    breaker: Arc<CircuitBreaker>,
}

impl ProviderClient {
    pub fn new(base_url: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
            breaker,
        }
    }

    async fn call(
        &self,
        provider_id: &str,
        action: &str,
        body: Value,
    ) -> Result<ProviderResult, CoreError> {
        if !self.breaker.can_execute(provider_id).await {
            return Err(CoreError::ProviderUnavailable);
        }

        let url = format!("{}/providers/{provider_id}/{action}", self.base_url);
        let response = self.http.post(&url).json(&body).send().await;

        match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<ProviderResult>().await {
                    Ok(result) => {
                        if result.success {
                            self.breaker.record_success(provider_id).await;
                        } else {
                            self.breaker.record_failure(provider_id).await;
                        }
                        Ok(result)
                    }
                    Err(source) => {
                        self.breaker.record_failure(provider_id).await;
                        Err(CoreError::ProviderError {
                            message: source.to_string(),
                        })
                    }
                }
            }
            Ok(response) => {
                self.breaker.record_failure(provider_id).await;
                Err(CoreError::ProviderError {
                    message: format!("provider returned status {}", response.status()),
                })
            }
            Err(source) if source.is_timeout() => {
                self.breaker.record_failure(provider_id).await;
                Err(CoreError::ProviderTimeout)
            }
            Err(source) => {
                self.breaker.record_failure(provider_id).await;
                tracing::warn!(provider_id, action, error = %source, "provider transport error");
                Err(CoreError::ProviderError {
                    message: source.to_string(),
                })
            }
        }
    }

    pub async fn authorize(
        &self,
        provider_id: &str,
        req: AuthorizeRequest<'_>,
    ) -> Result<ProviderResult, CoreError> {
        self.call(
            provider_id,
            "authorize",
            serde_json::to_value(&req).unwrap_or(Value::Null),
        )
        .await
    }

    pub async fn capture(
        &self,
        provider_id: &str,
        req: CaptureRequest<'_>,
    ) -> Result<ProviderResult, CoreError> {
        self.call(
            provider_id,
            "capture",
            serde_json::to_value(&req).unwrap_or(Value::Null),
        )
        .await
    }

    pub async fn refund(
        &self,
        provider_id: &str,
        req: RefundRequest<'_>,
    ) -> Result<ProviderResult, CoreError> {
        self.call(
            provider_id,
            "refund",
            serde_json::to_value(&req).unwrap_or(Value::Null),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payrail_breaker::BreakerConfig;

    #[tokio::test]
    async fn open_breaker_short_circuits_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(payrail_store::FileDurableStore::new(dir.path()));
        let breaker = Arc::new(CircuitBreaker::new(store, BreakerConfig { failure_threshold: 1, ..BreakerConfig::default() }));
        breaker.record_failure("providerA").await;

        let client = ProviderClient::new("http://127.0.0.1:1", breaker);
        let result = client
            .authorize(
                "providerA",
                AuthorizeRequest {
                    payment_id: "pi_1",
                    amount: 100,
                    currency: "USD",
                    pan: "4111111111111111",
                    expiry: "12/28",
                    merchant_id: "m_1",
                },
            )
            .await;
        assert!(matches!(result, Err(CoreError::ProviderUnavailable)));
    }
}
