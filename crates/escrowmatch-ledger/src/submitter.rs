//! Signing front-end for one identity.
//!
//! [`InteractionSubmitter`] owns a credential, assigns nonces, signs actions
//! and submits them to a [`Ledger`]. Operators, participants and the
//! settlement relayer each hold one.
//!
//! Nonces come from the ledger, so two submitters sharing a key (the
//! operator and the relayer both act as the owner) can pick the same nonce.
//! The loser sees [`EscrowError::NonceReplay`] and re-signs with a fresh
//! nonce, up to [`MAX_NONCE_RETRIES`] times.

use std::collections::BTreeMap;
use std::sync::Mutex;

use escrowmatch_types::{
    constants::MAX_NONCE_RETRIES, Action, Address, EscrowError, MatchId, ObligationId, Result,
    Role, SubmissionReceipt,
};
use rust_decimal::Decimal;

use crate::{credential::Credential, ledger::Ledger};

/// Submits signed actions on behalf of one credential.
pub struct InteractionSubmitter<L> {
    credential: Credential,
    role: Role,
    ledger: L,
    /// Serializes nonce assignment across this submitter's own submissions.
    nonce_lock: Mutex<()>,
}

impl<L: Ledger> InteractionSubmitter<L> {
    pub fn new(credential: Credential, role: Role, ledger: L) -> Self {
        Self {
            credential,
            role,
            ledger,
            nonce_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.credential.address()
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Sign `action` with the next nonce and submit it.
    pub fn submit(&self, action: Action) -> Result<SubmissionReceipt> {
        let _guard = self
            .nonce_lock
            .lock()
            .map_err(|_| EscrowError::Internal("submitter lock poisoned".into()))?;
        let function = action.function();
        let mut attempt = 0;
        let result = loop {
            let nonce = self.ledger.next_nonce(&self.credential.address())?;
            let envelope = self.credential.sign(action.clone(), nonce)?;
            match self.ledger.submit(envelope) {
                Err(EscrowError::NonceReplay { .. }) if attempt < MAX_NONCE_RETRIES => {
                    attempt += 1;
                    tracing::debug!(
                        role = %self.role,
                        function,
                        nonce,
                        attempt,
                        "Nonce taken by another submitter; re-signing"
                    );
                }
                other => break other,
            }
        };

        match result {
            Ok(receipt) => {
                tracing::info!(
                    role = %self.role,
                    function,
                    seq = receipt.seq.0,
                    "Submission accepted"
                );
                Ok(receipt)
            }
            Err(err) if err.is_rejection() => {
                tracing::warn!(
                    role = %self.role,
                    function,
                    error = %err,
                    "Submission rejected"
                );
                Err(err)
            }
            Err(err) => {
                tracing::error!(
                    role = %self.role,
                    function,
                    error = %err,
                    "Submission failed"
                );
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------
    // Typed helpers, one per contract function
    // -----------------------------------------------------------------

    pub fn create_match(
        &self,
        match_id: impl Into<MatchId>,
        stake_amount: Decimal,
        capacity: u32,
        metadata: BTreeMap<String, String>,
    ) -> Result<SubmissionReceipt> {
        self.submit(Action::CreateMatch {
            match_id: match_id.into(),
            stake_amount,
            capacity,
            metadata,
        })
    }

    pub fn join_match(&self, match_id: impl Into<MatchId>) -> Result<SubmissionReceipt> {
        self.submit(Action::JoinMatch {
            match_id: match_id.into(),
        })
    }

    pub fn mark_deposit(
        &self,
        match_id: impl Into<MatchId>,
        participant: Address,
        deposit_ref: impl Into<String>,
    ) -> Result<SubmissionReceipt> {
        self.submit(Action::MarkDeposit {
            match_id: match_id.into(),
            participant,
            deposit_ref: deposit_ref.into(),
        })
    }

    pub fn start_match(&self, match_id: impl Into<MatchId>) -> Result<SubmissionReceipt> {
        self.submit(Action::StartMatch {
            match_id: match_id.into(),
        })
    }

    pub fn set_payout(
        &self,
        match_id: impl Into<MatchId>,
        winner: Address,
    ) -> Result<SubmissionReceipt> {
        self.submit(Action::SetPayout {
            match_id: match_id.into(),
            winner,
        })
    }

    pub fn mark_paid(
        &self,
        obligation_id: ObligationId,
        external_tx_ref: impl Into<String>,
    ) -> Result<SubmissionReceipt> {
        self.submit(Action::MarkPaid {
            obligation_id,
            external_tx_ref: external_tx_ref.into(),
        })
    }
}

impl<L> std::fmt::Debug for InteractionSubmitter<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionSubmitter")
            .field("address", &self.credential.address())
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}
