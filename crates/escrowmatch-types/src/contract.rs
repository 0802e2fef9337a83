//! The materialized contract state and its read-only views.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, Match, MatchId, ObligationId, PayoutObligation};

/// Fixed parameters the contract is deployed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genesis {
    /// The operator identity. Owner-only transitions require this caller.
    pub owner: Address,
    /// Reference to the custodial account the relayer pays from.
    pub custodial_account: String,
}

/// The full contract state: the left fold of every accepted action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractState {
    pub owner: Address,
    pub custodial_account: String,
    pub matches: BTreeMap<MatchId, Match>,
    /// Obligations in creation order.
    pub obligations: Vec<PayoutObligation>,
    /// Number of log entries folded into this state.
    pub applied: u64,
    /// How many of those entries were rejected and folded as no-ops.
    pub rejected: u64,
}

impl ContractState {
    /// The state before any action.
    #[must_use]
    pub fn genesis(genesis: &Genesis) -> Self {
        Self {
            owner: genesis.owner,
            custodial_account: genesis.custodial_account.clone(),
            matches: BTreeMap::new(),
            obligations: Vec::new(),
            applied: 0,
            rejected: 0,
        }
    }

    #[must_use]
    pub fn is_owner(&self, addr: &Address) -> bool {
        self.owner == *addr
    }

    #[must_use]
    pub fn get_match(&self, id: &MatchId) -> Option<&Match> {
        self.matches.get(id)
    }

    #[must_use]
    pub fn obligation(&self, id: &ObligationId) -> Option<&PayoutObligation> {
        self.obligations.iter().find(|o| o.id == *id)
    }

    pub fn obligation_mut(&mut self, id: &ObligationId) -> Option<&mut PayoutObligation> {
        self.obligations.iter_mut().find(|o| o.id == *id)
    }

    /// Obligations with `paid == false`, in creation order.
    pub fn pending_obligations(&self) -> impl Iterator<Item = &PayoutObligation> {
        self.obligations.iter().filter(|o| o.is_pending())
    }

    /// The unpaid obligation for `(recipient, match)`, if one exists.
    #[must_use]
    pub fn unpaid_obligation_for(
        &self,
        recipient: &Address,
        match_id: &MatchId,
    ) -> Option<&PayoutObligation> {
        self.pending_obligations()
            .find(|o| o.recipient == *recipient && o.match_id == *match_id)
    }

    /// Aggregate view for display and reporting consumers.
    #[must_use]
    pub fn summary(&self) -> StateSummary {
        let mut by_status = BTreeMap::new();
        for m in self.matches.values() {
            *by_status.entry(m.status.to_string()).or_insert(0usize) += 1;
        }
        let pending: Vec<_> = self.pending_obligations().collect();
        StateSummary {
            matches: self.matches.len(),
            matches_by_status: by_status,
            pending_obligations: pending.len(),
            pending_amount: pending.iter().map(|o| o.amount).sum(),
            paid_obligations: self.obligations.len() - pending.len(),
            applied: self.applied,
            rejected: self.rejected,
        }
    }
}

/// Read-only summary of a [`ContractState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSummary {
    pub matches: usize,
    pub matches_by_status: BTreeMap<String, usize>,
    pub pending_obligations: usize,
    pub pending_amount: Decimal,
    pub paid_obligations: usize,
    pub applied: u64,
    pub rejected: u64,
}
