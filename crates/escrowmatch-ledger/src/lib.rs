//! # escrowmatch-ledger
//!
//! **Ordering Plane**: the single source of truth for which actions happened
//! and in what order.
//!
//! ## Architecture
//!
//! 1. **Credential**: ed25519 identity; signs envelopes, verifies them
//! 2. **Ledger**: admits signed envelopes and fixes their order
//! 3. **InteractionSubmitter**: signs and submits on behalf of one identity
//! 4. **Materializer**: folds the ordered log into local contract state
//!
//! ## Submission Flow
//!
//! ```text
//! Submitter.sign() → Ledger.submit() → verify signature → check nonce
//!     → reducer dry-run on head state → append → SubmissionReceipt
//! ```
//!
//! Only actions the reducer accepts are ever appended.

pub mod credential;
pub mod ledger;
pub mod materializer;
pub mod submitter;

pub use credential::{verify_envelope, Credential};
pub use ledger::{InMemoryLedger, Ledger};
pub use materializer::Materializer;
pub use submitter::InteractionSubmitter;
