//! # escrowmatch-relayer
//!
//! **Settlement Plane**: the only component that moves value. It reads the
//! materialized contract state, pays every pending obligation out of the
//! custodial account, and acknowledges each payment back on the ledger.
//!
//! ## Architecture
//!
//! 1. **TransferExecutor**: async boundary to the payment rail
//! 2. **PayoutJournal**: durable `{obligation -> tx ref}` record, fsynced
//!    before any acknowledgement
//! 3. **SettlementRelayer**: poll loop tying the ledger, executor and
//!    journal together
//!
//! ## Payout Flow
//!
//! ```text
//! Materializer → pending obligation → TransferExecutor.transfer()
//!     → PayoutJournal.record() (fsync) → markPaid(ref) on the ledger
//! ```
//!
//! A payment whose ref reached the journal is never transferred again.

pub mod executor;
pub mod journal;
pub mod relayer;

pub use executor::{TransferError, TransferExecutor, TransferRequest};
pub use journal::{FileJournal, JournalRecord, MemoryJournal, PayoutJournal};
pub use relayer::{CycleReport, SettlementRelayer};
