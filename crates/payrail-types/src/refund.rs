use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundState {
    Created,
    PendingApproval,
    Approved,
    Succeeded,
    Failed,
}

impl RefundState {
    pub fn as_str(self) -> &'static str {
        match self {
            RefundState::Created => "created",
            RefundState::PendingApproval => "pending_approval",
            RefundState::Approved => "approved",
            RefundState::Succeeded => "succeeded",
            RefundState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "created" => RefundState::Created,
            "pending_approval" => RefundState::PendingApproval,
            "approved" => RefundState::Approved,
            "succeeded" => RefundState::Succeeded,
            "failed" => RefundState::Failed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
    pub currency: String,
    pub reason: Option<String>,
    pub requested_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    pub merchant_id: String,
    pub state: RefundState,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: std::collections::BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_and_parse_round_trip_for_every_variant() {
        let variants = [
            RefundState::Created,
            RefundState::PendingApproval,
            RefundState::Approved,
            RefundState::Succeeded,
            RefundState::Failed,
        ];
        for state in variants {
            assert_eq!(RefundState::parse(state.as_str()), Some(state));
        }
    }

    #[test]
    fn parse_rejects_unknown_value() {
        assert_eq!(RefundState::parse("bogus"), None);
    }
}
