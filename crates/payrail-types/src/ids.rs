use uuid::Uuid;

fn hex_suffix(n: usize) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    raw[..n.min(raw.len())].to_string()
}

pub fn new_payment_id() -> String {
    format!("pi_{}", hex_suffix(12))
}

pub fn new_refund_id() -> String {
    format!("ref_{}", hex_suffix(12))
}

pub fn new_dispute_id() -> String {
    format!("dsp_{}", hex_suffix(12))
}

pub fn new_ledger_entry_id() -> String {
    format!("evt_{}", hex_suffix(12))
}

pub fn new_outbox_event_id() -> String {
    format!("oevt_{}", hex_suffix(12))
}

pub fn new_vault_token() -> String {
    format!("tok_{}", hex_suffix(24))
}

pub fn new_correlation_id() -> String {
    format!("corr_{}", hex_suffix(16))
}

pub fn new_webhook_event_id() -> String {
    format!("whevt_{}", hex_suffix(12))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_entity_prefix() {
        assert!(new_payment_id().starts_with("pi_"));
        assert!(new_refund_id().starts_with("ref_"));
        assert!(new_dispute_id().starts_with("dsp_"));
        assert!(new_ledger_entry_id().starts_with("evt_"));
        assert!(new_outbox_event_id().starts_with("oevt_"));
        assert!(new_vault_token().starts_with("tok_"));
        assert!(new_correlation_id().starts_with("corr_"));
        assert!(new_webhook_event_id().starts_with("whevt_"));
    }

    #[test]
    fn successive_ids_are_unique() {
        assert_ne!(new_payment_id(), new_payment_id());
    }
}
