//! Payout obligations: recorded, not-yet-settled promises to pay.
//!
//! ```text
//!   ┌────────┐  markPaid(ref)  ┌──────┐
//!   │ UNPAID ├────────────────▶│ PAID │
//!   └────────┘                 └──────┘
//! ```
//!
//! `paid` flips false → true exactly once, and `external_tx_ref` is set on
//! that same transition and never otherwise.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, EscrowError, MatchId, ObligationId, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutObligation {
    pub id: ObligationId,
    pub recipient: Address,
    pub amount: Decimal,
    /// The match whose payout created this obligation.
    pub match_id: MatchId,
    pub paid: bool,
    pub external_tx_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PayoutObligation {
    #[must_use]
    pub fn new(
        id: ObligationId,
        recipient: Address,
        amount: Decimal,
        match_id: MatchId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            recipient,
            amount,
            match_id,
            paid: false,
            external_tx_ref: None,
            created_at,
            paid_at: None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.paid
    }

    /// Record settlement. Fails if the obligation was already paid.
    ///
    /// # Errors
    /// Returns [`EscrowError::AlreadyPaid`] if `paid` is already true.
    pub fn mark_paid(&mut self, external_tx_ref: String, at: DateTime<Utc>) -> Result<()> {
        if self.paid {
            return Err(EscrowError::AlreadyPaid {
                obligation_id: self.id,
                external_tx_ref: self.external_tx_ref.clone().unwrap_or_default(),
            });
        }
        self.paid = true;
        self.external_tx_ref = Some(external_tx_ref);
        self.paid_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LedgerSeq;

    fn make_obligation() -> PayoutObligation {
        let match_id = MatchId::new("m1");
        PayoutObligation::new(
            ObligationId::deterministic(&match_id, LedgerSeq(4)),
            Address::dummy(1),
            Decimal::new(50, 0),
            match_id,
            DateTime::<Utc>::UNIX_EPOCH,
        )
    }

    #[test]
    fn new_obligation_is_unpaid() {
        let ob = make_obligation();
        assert!(ob.is_pending());
        assert!(ob.external_tx_ref.is_none());
        assert!(ob.paid_at.is_none());
    }

    #[test]
    fn mark_paid_sets_ref_and_time() {
        let mut ob = make_obligation();
        let at = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(5);
        ob.mark_paid("tx-1".into(), at).unwrap();
        assert!(ob.paid);
        assert_eq!(ob.external_tx_ref.as_deref(), Some("tx-1"));
        assert_eq!(ob.paid_at, Some(at));
    }

    #[test]
    fn double_pay_blocked_and_ref_kept() {
        let mut ob = make_obligation();
        let at = DateTime::<Utc>::UNIX_EPOCH;
        ob.mark_paid("tx-1".into(), at).unwrap();
        let err = ob.mark_paid("tx-2".into(), at).unwrap_err();
        assert!(matches!(err, EscrowError::AlreadyPaid { .. }));
        assert_eq!(ob.external_tx_ref.as_deref(), Some("tx-1"));
    }
}
