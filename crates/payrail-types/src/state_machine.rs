//! Transition tables for the three entity families. Each `validate_*`
//! function fails with `CoreError::InvalidTransition` if `target` is not in
//! the allowed set for `current` — the published table is total: anything
//! not listed is rejected, never silently permitted.

use crate::dispute::DisputeState;
use crate::error::CoreError;
use crate::payment::PaymentState;
use crate::refund::RefundState;

fn allowed_payment_transitions(current: PaymentState) -> &'static [PaymentState] {
    match current {
        PaymentState::Created => &[PaymentState::Authorized, PaymentState::Declined],
        PaymentState::Authorized => &[PaymentState::Captured, PaymentState::Reversed],
        PaymentState::Captured => &[PaymentState::Settled, PaymentState::Chargeback],
        PaymentState::Settled
        | PaymentState::Declined
        | PaymentState::Reversed
        | PaymentState::Chargeback => &[],
    }
}

pub fn validate_payment_transition(
    current: PaymentState,
    target: PaymentState,
) -> Result<(), CoreError> {
    if allowed_payment_transitions(current).contains(&target) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            entity: "payment",
            current: current.as_str().to_string(),
            target: target.as_str().to_string(),
        })
    }
}

fn allowed_refund_transitions(current: RefundState) -> &'static [RefundState] {
    match current {
        RefundState::Created => &[RefundState::PendingApproval],
        RefundState::PendingApproval => &[RefundState::Approved, RefundState::Failed],
        RefundState::Approved => &[RefundState::Succeeded, RefundState::Failed],
        RefundState::Succeeded | RefundState::Failed => &[],
    }
}

pub fn validate_refund_transition(
    current: RefundState,
    target: RefundState,
) -> Result<(), CoreError> {
    if allowed_refund_transitions(current).contains(&target) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            entity: "refund",
            current: current.as_str().to_string(),
            target: target.as_str().to_string(),
        })
    }
}

fn allowed_dispute_transitions(current: DisputeState) -> &'static [DisputeState] {
    match current {
        DisputeState::Opened => &[DisputeState::UnderReview],
        DisputeState::UnderReview => &[DisputeState::Won, DisputeState::Lost],
        DisputeState::Won | DisputeState::Lost => &[],
    }
}

pub fn validate_dispute_transition(
    current: DisputeState,
    target: DisputeState,
) -> Result<(), CoreError> {
    if allowed_dispute_transitions(current).contains(&target) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            entity: "dispute",
            current: current.as_str().to_string(),
            target: target.as_str().to_string(),
        })
    }
}
