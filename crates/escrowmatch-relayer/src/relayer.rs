//! The settlement relayer: turns pending obligations into transfers.
//!
//! ## Cycle
//!
//! ```text
//! refresh materializer → check invariants → for each pending obligation:
//!     journal has ref?  ── yes ──────────────────────────┐
//!          │ no                                          ▼
//!     transfer (under timeout) → journal + fsync → markPaid(ref)
//! ```
//!
//! Obligations are processed strictly one at a time. A failed or timed-out
//! transfer leaves the obligation pending for the next cycle. A failed
//! `markPaid` is retried next cycle with the journaled ref, so a payment is
//! never transferred twice once its ref is on disk.

use chrono::Utc;
use escrowmatch_ledger::{Credential, InteractionSubmitter, Ledger, Materializer};
use escrowmatch_types::{
    constants, ErrorKind, EscrowError, PayoutObligation, RelayerConfig, Result, Role,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};

use crate::{
    executor::{TransferExecutor, TransferRequest},
    journal::{FileJournal, JournalRecord, PayoutJournal},
};

/// Outcome counters of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// Unpaid obligations seen at the start of the cycle.
    pub pending: usize,
    /// Transfers executed and journaled this cycle.
    pub transferred: usize,
    /// `markPaid` accepted, or reconciled as already paid.
    pub acknowledged: usize,
    /// Obligations whose ref came from the journal rather than a new transfer.
    pub resumed_from_journal: usize,
    pub transfer_failures: usize,
    pub ack_failures: usize,
    /// Obligations with a non-positive amount; never transferred.
    pub skipped_invalid: usize,
}

impl CycleReport {
    /// Whether every pending obligation was settled this cycle.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.acknowledged + self.skipped_invalid == self.pending
    }
}

/// Off-ledger settlement agent for one custodial account.
pub struct SettlementRelayer<L, E, J> {
    config: RelayerConfig,
    submitter: InteractionSubmitter<L>,
    executor: E,
    journal: J,
    materializer: Materializer,
}

impl<L, E, J> SettlementRelayer<L, E, J>
where
    L: Ledger,
    E: TransferExecutor,
    J: PayoutJournal,
{
    /// Build a relayer.
    ///
    /// # Errors
    /// [`EscrowError::Configuration`] if the config is invalid, if its
    /// custodial account differs from the contract's, or if `credential` is
    /// not the contract owner.
    pub fn new(
        config: RelayerConfig,
        credential: Credential,
        ledger: L,
        executor: E,
        journal: J,
    ) -> Result<Self> {
        config.validate()?;
        let genesis = ledger.genesis();
        if genesis.custodial_account != config.custodial_account {
            return Err(EscrowError::Configuration(format!(
                "relayer custodial account {} does not match contract account {}",
                config.custodial_account, genesis.custodial_account
            )));
        }
        if credential.address() != genesis.owner {
            return Err(EscrowError::Configuration(format!(
                "relayer credential {} is not the contract owner",
                credential.address()
            )));
        }
        Ok(Self {
            config,
            submitter: InteractionSubmitter::new(credential, Role::Relayer, ledger),
            executor,
            journal,
            materializer: Materializer::new(genesis),
        })
    }

    #[must_use]
    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    #[must_use]
    pub fn journal(&self) -> &J {
        &self.journal
    }

    #[must_use]
    pub fn config(&self) -> &RelayerConfig {
        &self.config
    }

    /// Run one poll cycle.
    ///
    /// # Errors
    /// Fails on ledger divergence, an invariant violation, or a journal
    /// write failure after a completed transfer. Transfer and `markPaid`
    /// failures are counted in the report, not returned.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.materializer.refresh(self.submitter.ledger())?;
        self.materializer.verify()?;

        let pending = self.materializer.pending_obligations();
        let mut report = CycleReport {
            pending: pending.len(),
            ..CycleReport::default()
        };

        for obligation in &pending {
            self.settle(obligation, &mut report).await?;
        }

        if report.pending > 0 {
            tracing::info!(
                pending = report.pending,
                transferred = report.transferred,
                acknowledged = report.acknowledged,
                resumed = report.resumed_from_journal,
                transfer_failures = report.transfer_failures,
                ack_failures = report.ack_failures,
                skipped_invalid = report.skipped_invalid,
                "Settlement cycle complete"
            );
        } else {
            tracing::debug!(cursor = self.materializer.cursor().0, "No pending obligations");
        }
        Ok(report)
    }

    async fn settle(&self, obligation: &PayoutObligation, report: &mut CycleReport) -> Result<()> {
        if obligation.amount <= Decimal::ZERO {
            tracing::warn!(
                obligation = %obligation.id,
                amount = %obligation.amount,
                "Skipping obligation with non-positive amount"
            );
            report.skipped_invalid += 1;
            return Ok(());
        }

        let tx_ref = if let Some(tx_ref) = self.journal.tx_ref(&obligation.id)? {
            if self.journal.is_acknowledged(&obligation.id)? {
                tracing::warn!(
                    obligation = %obligation.id,
                    tx = %tx_ref,
                    "Journal holds an acknowledgement the ledger does not show; resubmitting markPaid"
                );
            } else {
                tracing::info!(
                    obligation = %obligation.id,
                    tx = %tx_ref,
                    "Resuming from journal; acknowledging without re-transfer"
                );
            }
            report.resumed_from_journal += 1;
            tx_ref
        } else {
            let tx_ref = match self.transfer(obligation).await {
                Ok(tx_ref) => tx_ref,
                Err(err) => {
                    tracing::warn!(
                        obligation = %obligation.id,
                        error = %err,
                        "Transfer failed; will retry next cycle"
                    );
                    report.transfer_failures += 1;
                    return Ok(());
                }
            };
            self.journal
                .record(JournalRecord::Transferred {
                    obligation_id: obligation.id,
                    recipient: obligation.recipient,
                    amount: obligation.amount,
                    external_tx_ref: tx_ref.clone(),
                    recorded_at: Utc::now(),
                })
                .inspect_err(|err| {
                    tracing::error!(
                        obligation = %obligation.id,
                        tx = %tx_ref,
                        error = %err,
                        "Transfer completed but could not be journaled; aborting cycle"
                    );
                })?;
            report.transferred += 1;
            tx_ref
        };

        let ledger_seq = match self.submitter.mark_paid(obligation.id, tx_ref.clone()) {
            Ok(receipt) => Some(receipt.seq),
            Err(EscrowError::AlreadyPaid {
                external_tx_ref, ..
            }) => {
                if external_tx_ref != tx_ref {
                    tracing::warn!(
                        obligation = %obligation.id,
                        journaled = %tx_ref,
                        recorded = %external_tx_ref,
                        "Obligation already paid under a different ref"
                    );
                }
                None
            }
            Err(err) => {
                tracing::warn!(
                    obligation = %obligation.id,
                    tx = %tx_ref,
                    error = %err,
                    "markPaid failed; will retry with journaled ref"
                );
                report.ack_failures += 1;
                return Ok(());
            }
        };
        report.acknowledged += 1;

        if let Err(err) = self.journal.record(JournalRecord::Acknowledged {
            obligation_id: obligation.id,
            ledger_seq,
            recorded_at: Utc::now(),
        }) {
            // The ledger already holds the payment; the ack record is bookkeeping.
            tracing::warn!(obligation = %obligation.id, error = %err, "Could not journal acknowledgement");
        }
        Ok(())
    }

    async fn transfer(&self, obligation: &PayoutObligation) -> Result<String> {
        let request = TransferRequest {
            obligation_id: obligation.id,
            recipient: obligation.recipient,
            amount: obligation.amount,
            custodial_account: self.config.custodial_account.clone(),
        };
        let timeout = self.config.broadcast_timeout;
        match time::timeout(timeout, self.executor.transfer(&request)).await {
            Ok(Ok(tx_ref)) => {
                tracing::info!(
                    obligation = %obligation.id,
                    recipient = %obligation.recipient.short(),
                    amount = %obligation.amount,
                    tx = %tx_ref,
                    "Transfer broadcast acknowledged"
                );
                Ok(tx_ref)
            }
            Ok(Err(err)) => Err(EscrowError::TransferFailed {
                obligation_id: obligation.id,
                reason: err.to_string(),
            }),
            Err(_) => Err(EscrowError::TransferTimeout {
                obligation_id: obligation.id,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Poll until `shutdown` becomes `true`.
    ///
    /// Cycle errors that leave the relayer without a trustworthy view of
    /// the ledger or of its own journal end the loop; anything else is
    /// logged and retried on the next tick.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            interval_ms = u64::try_from(self.config.poll_interval.as_millis()).unwrap_or(u64::MAX),
            custodial_account = %self.config.custodial_account,
            "Settlement relayer started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            if let Err(err) = self.run_cycle().await {
                if is_fatal(&err) {
                    tracing::error!(error = %err, "Settlement relayer stopping");
                    return Err(err);
                }
                tracing::warn!(error = %err, "Settlement cycle failed; retrying next tick");
            }
        }

        tracing::info!("Settlement relayer stopped");
        Ok(())
    }
}

impl<L, E> SettlementRelayer<L, E, FileJournal>
where
    L: Ledger,
    E: TransferExecutor,
{
    /// Build a relayer over the durable journal at `config.journal_path`.
    ///
    /// # Errors
    /// As [`SettlementRelayer::new`], plus any error opening the journal.
    pub fn with_file_journal(
        config: RelayerConfig,
        credential: Credential,
        ledger: L,
        executor: E,
    ) -> Result<Self> {
        config.validate()?;
        let journal = FileJournal::open(&config.journal_path)?;
        Self::new(config, credential, ledger, executor, journal)
    }
}

/// Errors after which continuing could pay twice or pay from a wrong view.
fn is_fatal(err: &EscrowError) -> bool {
    matches!(err.kind(), ErrorKind::Integrity) || matches!(err, EscrowError::Io(_))
}

impl<L, E, J> std::fmt::Debug for SettlementRelayer<L, E, J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementRelayer")
            .field("config", &self.config)
            .field("cursor", &self.materializer.cursor())
            .finish_non_exhaustive()
    }
}
