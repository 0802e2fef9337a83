//! Local materialization of the contract state.
//!
//! A [`Materializer`] folds the ledger's accepted actions, in order, through
//! the reducer. Any number of materializers over the same log reach the
//! same state root; the relayer runs one to discover pending obligations.

use escrowmatch_reducer::{check_invariants, compute_state_root, fold_entry};
use escrowmatch_types::{
    AcceptedAction, ContractState, EscrowError, Genesis, LedgerSeq, PayoutObligation, Result,
};

use crate::ledger::Ledger;

/// Incrementally folded view of a ledger.
#[derive(Debug, Clone)]
pub struct Materializer {
    genesis: Genesis,
    state: ContractState,
    /// Last folded entry, kept to detect a rewritten log on the next refresh.
    last_entry: Option<AcceptedAction>,
}

impl Materializer {
    #[must_use]
    pub fn new(genesis: Genesis) -> Self {
        let state = ContractState::genesis(&genesis);
        Self {
            genesis,
            state,
            last_entry: None,
        }
    }

    /// Fold an exported log from genesis, e.g. for an offline audit.
    pub fn replay_from_genesis(genesis: Genesis, log: &[AcceptedAction]) -> Result<Self> {
        let mut materializer = Self::new(genesis);
        materializer.apply_entries(log)?;
        Ok(materializer)
    }

    /// Fold the entire log of `ledger` from genesis.
    pub fn from_ledger<L: Ledger + ?Sized>(ledger: &L) -> Result<Self> {
        let mut materializer = Self::new(ledger.genesis());
        materializer.refresh(ledger)?;
        Ok(materializer)
    }

    /// Fetch and fold every entry past the cursor. Returns how many entries
    /// were folded.
    ///
    /// # Errors
    /// [`EscrowError::LogDiverged`] when the ledger no longer extends the
    /// folded prefix (a rewritten entry or a gap in sequence numbers).
    pub fn refresh<L: Ledger + ?Sized>(&mut self, ledger: &L) -> Result<usize> {
        let cursor = self.cursor();
        let Some(last) = self.last_entry.as_ref() else {
            let entries = ledger.entries_from(cursor)?;
            return self.apply_entries(&entries);
        };

        // Re-read the last folded entry and check it was not rewritten.
        let mut entries = ledger.entries_from(last.seq)?;
        if entries.is_empty() {
            return Err(EscrowError::LogDiverged {
                at: last.seq,
                reason: "ledger shrank below the folded prefix".into(),
            });
        }
        let overlap = entries.remove(0);
        if overlap != *last {
            return Err(EscrowError::LogDiverged {
                at: last.seq,
                reason: "previously folded entry changed".into(),
            });
        }
        self.apply_entries(&entries)
    }

    /// Fold `entries`, which must continue exactly at the cursor.
    pub fn apply_entries(&mut self, entries: &[AcceptedAction]) -> Result<usize> {
        for (idx, entry) in entries.iter().enumerate() {
            let expected = self.cursor();
            if entry.seq != expected {
                if let Some(prev) = idx.checked_sub(1).and_then(|i| entries.get(i)) {
                    self.last_entry = Some(prev.clone());
                }
                return Err(EscrowError::LogDiverged {
                    at: expected,
                    reason: format!("expected entry {expected}, got {}", entry.seq),
                });
            }
            if let Err(err) = fold_entry(&mut self.state, entry) {
                // Admitted by the ledger but rejected here: folded as a no-op.
                tracing::warn!(
                    seq = entry.seq.0,
                    action = %entry.action(),
                    error = %err,
                    "Ledger entry rejected during materialization"
                );
            }
        }
        if let Some(last) = entries.last() {
            self.last_entry = Some(last.clone());
            tracing::debug!(
                folded = entries.len(),
                cursor = self.cursor().0,
                "Materialized ledger suffix"
            );
        }
        Ok(entries.len())
    }

    #[must_use]
    pub fn state(&self) -> &ContractState {
        &self.state
    }

    #[must_use]
    pub fn genesis(&self) -> &Genesis {
        &self.genesis
    }

    /// Sequence number of the next entry to fold.
    #[must_use]
    pub fn cursor(&self) -> LedgerSeq {
        LedgerSeq(self.state.applied)
    }

    pub fn state_root(&self) -> Result<[u8; 32]> {
        compute_state_root(&self.state)
    }

    /// Check the contract invariants on the materialized state.
    pub fn verify(&self) -> Result<()> {
        check_invariants(&self.state)
    }

    /// Unpaid obligations, in creation order.
    #[must_use]
    pub fn pending_obligations(&self) -> Vec<PayoutObligation> {
        self.state.pending_obligations().cloned().collect()
    }
}
