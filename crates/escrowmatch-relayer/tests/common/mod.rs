//! Shared fixtures for relayer integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use escrowmatch_ledger::{Credential, InMemoryLedger, InteractionSubmitter, Ledger, Materializer};
use escrowmatch_relayer::{TransferError, TransferExecutor, TransferRequest};
use escrowmatch_types::*;
use rand::rngs::OsRng;
use rust_decimal::Decimal;

pub const OWNER_SECRET: [u8; 32] = [0x42; 32];
pub const CUSTODY: &str = "custody-1";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn owner_credential() -> Credential {
    Credential::from_secret_bytes(&OWNER_SECRET)
}

pub fn relayer_config(journal_path: impl Into<std::path::PathBuf>) -> RelayerConfig {
    RelayerConfig {
        poll_interval: Duration::from_millis(10),
        broadcast_timeout: Duration::from_millis(200),
        journal_path: journal_path.into(),
        custodial_account: CUSTODY.into(),
    }
}

/// A ledger with one finished match whose payout is pending.
pub struct Scenario {
    pub ledger: Arc<InMemoryLedger>,
    pub owner: InteractionSubmitter<Arc<InMemoryLedger>>,
    pub winner: Address,
}

impl Scenario {
    pub fn new() -> Self {
        let owner_cred = owner_credential();
        let ledger = Arc::new(
            InMemoryLedger::new(LedgerConfig::new(Genesis {
                owner: owner_cred.address(),
                custodial_account: CUSTODY.into(),
            }))
            .unwrap(),
        );
        let owner = InteractionSubmitter::new(owner_cred, Role::Owner, Arc::clone(&ledger));
        let mut scenario = Self {
            ledger,
            owner,
            winner: Address::dummy(0),
        };
        scenario.winner = scenario.finished_match("m1");
        scenario
    }

    /// Run a two-player match to a payout; returns the winner.
    pub fn finished_match(&self, id: &str) -> Address {
        let p1 = InteractionSubmitter::new(
            Credential::generate(&mut OsRng),
            Role::Participant,
            Arc::clone(&self.ledger),
        );
        let p2 = InteractionSubmitter::new(
            Credential::generate(&mut OsRng),
            Role::Participant,
            Arc::clone(&self.ledger),
        );
        self.owner
            .create_match(id, Decimal::new(25, 0), 2, BTreeMap::new())
            .unwrap();
        p1.join_match(id).unwrap();
        p2.join_match(id).unwrap();
        self.owner
            .mark_deposit(id, p1.address(), format!("{id}-dep-1"))
            .unwrap();
        self.owner
            .mark_deposit(id, p2.address(), format!("{id}-dep-2"))
            .unwrap();
        self.owner.start_match(id).unwrap();
        self.owner.set_payout(id, p1.address()).unwrap();
        p1.address()
    }

    pub fn view(&self) -> Materializer {
        Materializer::from_ledger(self.ledger.as_ref()).unwrap()
    }
}

// ---------------------------------------------------------------------------
// Scriptable executor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(TransferError),
    Hang,
}

/// Executor that follows a script, then succeeds. Refs are `tx-<n>`.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    paid: Mutex<Vec<TransferRequest>>,
}

impl ScriptedExecutor {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests that completed successfully.
    pub fn paid(&self) -> Vec<TransferRequest> {
        self.paid.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransferExecutor for ScriptedExecutor {
    async fn transfer(
        &self,
        request: &TransferRequest,
    ) -> std::result::Result<String, TransferError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Succeed);
        match step {
            Step::Succeed => {
                self.paid.lock().unwrap().push(request.clone());
                Ok(format!("tx-{n}"))
            }
            Step::Fail(err) => Err(err),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransferError::Network("unreachable".into()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fault-injecting ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    /// markPaid never reaches the ledger.
    DropMarkPaid,
    /// markPaid is applied, but the caller is told it was already paid.
    AcceptThenReportAlreadyPaid,
}

/// Wraps a ledger and injects faults into `markPaid` submissions.
pub struct FaultyLedger {
    pub inner: Arc<InMemoryLedger>,
    pub fault: Mutex<Fault>,
}

impl FaultyLedger {
    pub fn new(inner: Arc<InMemoryLedger>, fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fault: Mutex::new(fault),
        })
    }

    pub fn set_fault(&self, fault: Fault) {
        *self.fault.lock().unwrap() = fault;
    }
}

impl Ledger for FaultyLedger {
    fn genesis(&self) -> Genesis {
        self.inner.genesis()
    }

    fn submit(&self, envelope: ActionEnvelope) -> Result<SubmissionReceipt> {
        let Action::MarkPaid {
            obligation_id,
            external_tx_ref,
        } = envelope.action.clone()
        else {
            return self.inner.submit(envelope);
        };
        match *self.fault.lock().unwrap() {
            Fault::None => self.inner.submit(envelope),
            Fault::DropMarkPaid => Err(EscrowError::Internal("ledger unreachable".into())),
            Fault::AcceptThenReportAlreadyPaid => {
                self.inner.submit(envelope)?;
                Err(EscrowError::AlreadyPaid {
                    obligation_id,
                    external_tx_ref,
                })
            }
        }
    }

    fn entries_from(&self, from: LedgerSeq) -> Result<Vec<AcceptedAction>> {
        self.inner.entries_from(from)
    }

    fn head(&self) -> Result<LedgerSeq> {
        self.inner.head()
    }

    fn next_nonce(&self, caller: &Address) -> Result<u64> {
        self.inner.next_nonce(caller)
    }
}
