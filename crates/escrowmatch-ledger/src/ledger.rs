//! The ledger contract and an in-process implementation.
//!
//! A ledger provides one thing the rest of the system relies on: a single
//! agreed ordering of accepted actions. [`InMemoryLedger`] provides it
//! within one process by serializing admissions behind a mutex:
//!
//! 1. Verify the envelope signature against the caller address
//! 2. Enforce strictly increasing per-caller nonces (replay protection)
//! 3. Run the reducer against the head state
//! 4. Append the action only if the reducer accepted it
//!
//! Rejected submissions leave no trace in the log.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use escrowmatch_reducer::{apply_in_place, compute_state_root};
use escrowmatch_types::{
    AcceptedAction, ActionEnvelope, Address, ContractState, EscrowError, Genesis, LedgerConfig,
    LedgerSeq, Result, SubmissionReceipt,
};

use crate::credential::verify_envelope;

/// Transport to an ordered, append-only action log.
pub trait Ledger: Send + Sync {
    /// Deployment parameters of the hosted contract.
    fn genesis(&self) -> Genesis;

    /// Submit a signed envelope. Returns the receipt when accepted, or the
    /// specific rejection.
    fn submit(&self, envelope: ActionEnvelope) -> Result<SubmissionReceipt>;

    /// Accepted actions at positions `from..head`, in order.
    fn entries_from(&self, from: LedgerSeq) -> Result<Vec<AcceptedAction>>;

    /// Position the next accepted action will take (the log length).
    fn head(&self) -> Result<LedgerSeq>;

    /// Smallest nonce `caller` may use next.
    fn next_nonce(&self, caller: &Address) -> Result<u64>;
}

impl<L: Ledger + ?Sized> Ledger for Arc<L> {
    fn genesis(&self) -> Genesis {
        (**self).genesis()
    }

    fn submit(&self, envelope: ActionEnvelope) -> Result<SubmissionReceipt> {
        (**self).submit(envelope)
    }

    fn entries_from(&self, from: LedgerSeq) -> Result<Vec<AcceptedAction>> {
        (**self).entries_from(from)
    }

    fn head(&self) -> Result<LedgerSeq> {
        (**self).head()
    }

    fn next_nonce(&self, caller: &Address) -> Result<u64> {
        (**self).next_nonce(caller)
    }
}

struct LedgerInner {
    log: Vec<AcceptedAction>,
    /// Reducer output after the whole log; used for admission.
    head_state: ContractState,
    /// Last accepted nonce per caller.
    nonces: HashMap<Address, u64>,
}

impl LedgerInner {
    /// Smallest nonce `caller` may use next. `None` once the caller's nonce
    /// space is used up.
    fn expected_nonce(&self, caller: &Address) -> Option<u64> {
        match self.nonces.get(caller) {
            Some(last) => last.checked_add(1),
            None => Some(0),
        }
    }
}

/// Thread-safe in-process ledger. Clones share the same log.
#[derive(Clone)]
pub struct InMemoryLedger {
    config: Arc<LedgerConfig>,
    inner: Arc<Mutex<LedgerInner>>,
}

impl InMemoryLedger {
    /// Create an empty ledger hosting the contract described by `config`.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let head_state = ContractState::genesis(&config.genesis);
        Ok(Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(LedgerInner {
                log: Vec::new(),
                head_state,
                nonces: HashMap::new(),
            })),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerInner>> {
        self.inner
            .lock()
            .map_err(|_| EscrowError::Internal("ledger lock poisoned".into()))
    }

    /// State root of the ledger's own head state, for cross-checking
    /// independent materializations.
    pub fn head_state_root(&self) -> Result<[u8; 32]> {
        compute_state_root(&self.lock()?.head_state)
    }

    /// Number of accepted actions.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.log.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Ledger for InMemoryLedger {
    fn genesis(&self) -> Genesis {
        self.config.genesis.clone()
    }

    fn submit(&self, envelope: ActionEnvelope) -> Result<SubmissionReceipt> {
        verify_envelope(&envelope)?;

        let mut inner = self.lock()?;
        if inner.log.len() >= self.config.max_log_entries {
            return Err(EscrowError::Internal(format!(
                "ledger full ({} entries)",
                self.config.max_log_entries
            )));
        }

        // u64::MAX is never admitted, so the next nonce is always representable.
        let expected = inner.expected_nonce(&envelope.caller).unwrap_or(u64::MAX);
        if envelope.nonce < expected || envelope.nonce == u64::MAX {
            return Err(EscrowError::NonceReplay {
                caller: envelope.caller,
                nonce: envelope.nonce,
                expected,
            });
        }

        // Ledger time never runs backwards, even if the wall clock does.
        let now = Utc::now();
        let accepted_at: DateTime<Utc> = inner
            .log
            .last()
            .map_or(now, |last| last.accepted_at.max(now));
        let entry = AcceptedAction {
            seq: LedgerSeq(inner.log.len() as u64),
            envelope,
            accepted_at,
        };

        let LedgerInner {
            log,
            head_state,
            nonces,
        } = &mut *inner;
        if let Err(err) = apply_in_place(head_state, entry.action(), &entry.context()) {
            tracing::warn!(
                function = entry.action().function(),
                caller = %entry.envelope.caller.short(),
                error = %err,
                "Submission rejected"
            );
            return Err(err);
        }
        head_state.applied += 1;
        nonces.insert(entry.envelope.caller, entry.envelope.nonce);

        let receipt = SubmissionReceipt {
            seq: entry.seq,
            function: entry.action().function().to_string(),
            accepted_at,
        };
        tracing::info!(
            seq = entry.seq.0,
            action = %entry.action(),
            caller = %entry.envelope.caller.short(),
            "Action accepted"
        );
        log.push(entry);
        Ok(receipt)
    }

    fn entries_from(&self, from: LedgerSeq) -> Result<Vec<AcceptedAction>> {
        let inner = self.lock()?;
        let start = usize::try_from(from.0)
            .map_err(|_| EscrowError::Internal(format!("sequence {from} out of range")))?;
        Ok(inner.log.get(start..).map(<[_]>::to_vec).unwrap_or_default())
    }

    fn head(&self) -> Result<LedgerSeq> {
        Ok(LedgerSeq(self.lock()?.log.len() as u64))
    }

    fn next_nonce(&self, caller: &Address) -> Result<u64> {
        self.lock()?.expected_nonce(caller).ok_or_else(|| {
            EscrowError::Internal(format!("nonce space exhausted for {}", caller.short()))
        })
    }
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedger")
            .field("genesis", &self.config.genesis)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use escrowmatch_types::{Action, ErrorKind, MatchId};
    use rand::rngs::OsRng;
    use rust_decimal::Decimal;

    use super::*;
    use crate::credential::Credential;

    fn setup() -> (InMemoryLedger, Credential) {
        let owner = Credential::generate(&mut OsRng);
        let ledger = InMemoryLedger::new(LedgerConfig::new(Genesis {
            owner: owner.address(),
            custodial_account: "custody".into(),
        }))
        .unwrap();
        (ledger, owner)
    }

    fn create(id: &str) -> Action {
        Action::CreateMatch {
            match_id: MatchId::new(id),
            stake_amount: Decimal::ONE,
            capacity: 2,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn accepted_actions_are_ordered() {
        let (ledger, owner) = setup();
        let r0 = ledger.submit(owner.sign(create("a"), 0).unwrap()).unwrap();
        let r1 = ledger.submit(owner.sign(create("b"), 1).unwrap()).unwrap();
        assert_eq!(r0.seq, LedgerSeq(0));
        assert_eq!(r1.seq, LedgerSeq(1));
        assert_eq!(r1.function, "createMatch");
        assert!(r1.accepted_at >= r0.accepted_at);
        assert_eq!(ledger.head().unwrap(), LedgerSeq(2));
        assert_eq!(ledger.entries_from(LedgerSeq(1)).unwrap().len(), 1);
        assert!(ledger.entries_from(LedgerSeq(5)).unwrap().is_empty());
    }

    #[test]
    fn rejected_action_not_appended() {
        let (ledger, owner) = setup();
        ledger.submit(owner.sign(create("a"), 0).unwrap()).unwrap();
        let err = ledger.submit(owner.sign(create("a"), 1).unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(ledger.len().unwrap(), 1);
        // The nonce was not consumed by the rejection.
        assert_eq!(ledger.next_nonce(&owner.address()).unwrap(), 1);
    }

    #[test]
    fn replayed_envelope_rejected() {
        let (ledger, owner) = setup();
        let env = owner.sign(create("a"), 0).unwrap();
        ledger.submit(env.clone()).unwrap();
        let err = ledger.submit(env).unwrap_err();
        assert!(matches!(err, EscrowError::NonceReplay { expected: 1, .. }));
    }

    #[test]
    fn bad_signature_rejected_before_reducer() {
        let (ledger, owner) = setup();
        let mut env = owner.sign(create("a"), 0).unwrap();
        env.signature[0] ^= 0xFF;
        let err = ledger.submit(env).unwrap_err();
        assert!(matches!(err, EscrowError::SignatureInvalid { .. }));
        assert!(ledger.is_empty().unwrap());
    }

    #[test]
    fn non_owner_rejected_with_authorization_error() {
        let (ledger, _owner) = setup();
        let mallory = Credential::generate(&mut OsRng);
        let err = ledger.submit(mallory.sign(create("a"), 0).unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn max_nonce_refused_and_ledger_stays_usable() {
        let (ledger, owner) = setup();
        ledger.submit(owner.sign(create("a"), 0).unwrap()).unwrap();
        let mallory = Credential::generate(&mut OsRng);
        let join = Action::JoinMatch {
            match_id: MatchId::new("a"),
        };

        let err = ledger
            .submit(mallory.sign(join.clone(), u64::MAX).unwrap())
            .unwrap_err();
        assert!(matches!(err, EscrowError::NonceReplay { nonce: u64::MAX, expected: 0, .. }));
        assert_eq!(ledger.len().unwrap(), 1);
        assert_eq!(ledger.next_nonce(&mallory.address()).unwrap(), 0);

        // The highest admissible nonce still works and leaves no wrap-around.
        ledger
            .submit(mallory.sign(join, u64::MAX - 1).unwrap())
            .unwrap();
        let err = ledger
            .submit(mallory.sign(create("b"), 0).unwrap())
            .unwrap_err();
        assert!(matches!(err, EscrowError::NonceReplay { expected: u64::MAX, .. }));
        assert_eq!(ledger.next_nonce(&mallory.address()).unwrap(), u64::MAX);

        // Other callers are unaffected.
        ledger.submit(owner.sign(create("c"), 1).unwrap()).unwrap();
        assert_eq!(ledger.len().unwrap(), 3);
    }

    #[test]
    fn clones_share_the_log() {
        let (ledger, owner) = setup();
        let other = ledger.clone();
        ledger.submit(owner.sign(create("a"), 0).unwrap()).unwrap();
        assert_eq!(other.len().unwrap(), 1);
    }

    #[test]
    fn empty_custodial_account_rejected() {
        let err = InMemoryLedger::new(LedgerConfig::new(Genesis {
            owner: Address::dummy(1),
            custodial_account: " ".into(),
        }))
        .unwrap_err();
        assert!(matches!(err, EscrowError::Configuration(_)));
    }
}
