//! Settlement Ledger
//!
//! One-shot settlement flag per payment. The balance is written only by
//! the caller that wins the claim.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::sync::lock;
use crate::purchase::types::{Amount, PaymentId, UserId};

/// Record of a settled payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementEntry {
    /// Charged user.
    pub user_id: UserId,
    /// Charged amount.
    pub amount: Amount,
    /// When the claim was made.
    pub settled_at: DateTime<Utc>,
}

/// Result of a settlement claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    /// First claim; the caller applies the settlement.
    Claimed,
    /// Already settled; the caller must not write again.
    AlreadySettled(SettlementEntry),
}

/// Ledger of settled payments.
#[derive(Default)]
pub struct SettlementLedger {
    entries: Mutex<HashMap<PaymentId, SettlementEntry>>,
}

impl SettlementLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the settlement of a payment.
    pub fn claim(&self, payment_id: &PaymentId, entry: SettlementEntry) -> ClaimResult {
        let mut entries = lock(&self.entries);
        if let Some(existing) = entries.get(payment_id) {
            debug!(payment = %payment_id, "Settlement already claimed");
            return ClaimResult::AlreadySettled(existing.clone());
        }
        entries.insert(payment_id.clone(), entry);
        ClaimResult::Claimed
    }

    /// Has the payment been settled?
    pub fn is_settled(&self, payment_id: &PaymentId) -> bool {
        lock(&self.entries).contains_key(payment_id)
    }

    /// Settlement record for a payment.
    pub fn entry(&self, payment_id: &PaymentId) -> Option<SettlementEntry> {
        lock(&self.entries).get(payment_id).cloned()
    }

    /// Number of settled payments.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// True when nothing has settled.
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(amount: Amount) -> SettlementEntry {
        SettlementEntry {
            user_id: UserId::new("alice"),
            amount,
            settled_at: Utc::now(),
        }
    }

    #[test]
    fn test_claim_is_one_shot() {
        let ledger = SettlementLedger::new();
        let id = PaymentId::new("pay-1");

        assert_eq!(ledger.claim(&id, entry(500)), ClaimResult::Claimed);
        assert!(ledger.is_settled(&id));

        match ledger.claim(&id, entry(900)) {
            ClaimResult::AlreadySettled(existing) => assert_eq!(existing.amount, 500),
            ClaimResult::Claimed => panic!("second claim must not win"),
        }
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_claims_from_many_threads() {
        let ledger = std::sync::Arc::new(SettlementLedger::new());
        let id = PaymentId::new("pay-1");

        let winners: usize = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                let id = id.clone();
                std::thread::spawn(move || ledger.claim(&id, entry(1)) == ClaimResult::Claimed)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(winners, 1);
    }
}
