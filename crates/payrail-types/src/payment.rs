use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Created,
    Authorized,
    Captured,
    Settled,
    Declined,
    Reversed,
    Chargeback,
}

impl PaymentState {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentState::Created => "created",
            PaymentState::Authorized => "authorized",
            PaymentState::Captured => "captured",
            PaymentState::Settled => "settled",
            PaymentState::Declined => "declined",
            PaymentState::Reversed => "reversed",
            PaymentState::Chargeback => "chargeback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "created" => PaymentState::Created,
            "authorized" => PaymentState::Authorized,
            "captured" => PaymentState::Captured,
            "settled" => PaymentState::Settled,
            "declined" => PaymentState::Declined,
            "reversed" => PaymentState::Reversed,
            "chargeback" => PaymentState::Chargeback,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub merchant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<String>,
    pub idempotency_key: String,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub state: PaymentState,
}

impl PaymentIntent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            PaymentState::Settled
                | PaymentState::Declined
                | PaymentState::Reversed
                | PaymentState::Chargeback
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_and_parse_round_trip_for_every_variant() {
        let variants = [
            PaymentState::Created,
            PaymentState::Authorized,
            PaymentState::Captured,
            PaymentState::Settled,
            PaymentState::Declined,
            PaymentState::Reversed,
            PaymentState::Chargeback,
        ];
        for state in variants {
            assert_eq!(PaymentState::parse(state.as_str()), Some(state));
        }
    }

    #[test]
    fn parse_rejects_unknown_value() {
        assert_eq!(PaymentState::parse("not_a_state"), None);
    }

    #[test]
    fn only_settled_declined_reversed_chargeback_are_terminal() {
        let now = Utc::now();
        let mut payment = PaymentIntent {
            id: "pi_1".to_string(),
            amount: 100,
            currency: "USD".to_string(),
            merchant_id: "m_1".to_string(),
            customer_email: None,
            description: None,
            provider: None,
            token: None,
            provider_ref: None,
            decline_reason: None,
            idempotency_key: "idem_1".to_string(),
            correlation_id: "corr_1".to_string(),
            created_at: now,
            updated_at: now,
            metadata: BTreeMap::new(),
            state: PaymentState::Created,
        };
        assert!(!payment.is_terminal());
        payment.state = PaymentState::Authorized;
        assert!(!payment.is_terminal());
        payment.state = PaymentState::Captured;
        assert!(!payment.is_terminal());
        for terminal in [
            PaymentState::Settled,
            PaymentState::Declined,
            PaymentState::Reversed,
            PaymentState::Chargeback,
        ] {
            payment.state = terminal;
            assert!(payment.is_terminal());
        }
    }
}
