//! Error types for EscrowMatch.
//!
//! All errors use the `EM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Authorization errors
//! - 2xx: Lookup errors
//! - 3xx: State conflict errors
//! - 4xx: Capacity errors
//! - 5xx: Payment / transfer errors
//! - 6xx: Determinism / integrity errors
//! - 9xx: General / internal errors
//!
//! [`EscrowError::kind`] folds the codes onto the coarse taxonomy operator
//! tooling reasons about.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{Address, Capability, LedgerSeq, MatchId, MatchStatus, ObligationId};

/// Coarse classification of an [`EscrowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authorization,
    NotFound,
    StateConflict,
    Capacity,
    AlreadyPaid,
    TransferExecution,
    Validation,
    Integrity,
    Internal,
}

/// Central error enum for all EscrowMatch operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EscrowError {
    // =================================================================
    // Authorization Errors (1xx)
    // =================================================================
    /// The caller lacks the capability the function requires.
    #[error("EM_ERR_100: {function} requires {required} authority; caller {caller} does not have it")]
    Unauthorized {
        function: &'static str,
        caller: Address,
        required: Capability,
    },

    /// The envelope signature does not verify against the caller address.
    #[error("EM_ERR_101: Envelope signature verification failed for caller {caller}")]
    SignatureInvalid { caller: Address },

    /// Nonce not greater than the caller's last accepted nonce.
    #[error("EM_ERR_102: Nonce replay for caller {caller}: got {nonce}, expected at least {expected}")]
    NonceReplay {
        caller: Address,
        nonce: u64,
        expected: u64,
    },

    // =================================================================
    // Lookup Errors (2xx)
    // =================================================================
    #[error("EM_ERR_200: Match not found: {0}")]
    MatchNotFound(MatchId),

    #[error("EM_ERR_201: Participant {participant} is not registered in match {match_id}")]
    ParticipantNotFound {
        match_id: MatchId,
        participant: Address,
    },

    #[error("EM_ERR_202: Payout obligation not found: {0}")]
    ObligationNotFound(ObligationId),

    // =================================================================
    // State Conflict Errors (3xx)
    // =================================================================
    #[error("EM_ERR_300: Match already exists: {0}")]
    MatchAlreadyExists(MatchId),

    /// Transition attempted from the wrong source status.
    #[error("EM_ERR_301: Match {match_id} is in {actual}, expected {expected}")]
    InvalidTransition {
        match_id: MatchId,
        expected: MatchStatus,
        actual: MatchStatus,
    },

    #[error("EM_ERR_302: {participant} already joined match {match_id}")]
    AlreadyJoined {
        match_id: MatchId,
        participant: Address,
    },

    #[error("EM_ERR_303: Payout already set for match {0}")]
    PayoutAlreadySet(MatchId),

    /// Deposit references are frozen once a match finished.
    #[error("EM_ERR_304: Cannot change deposit ref of {participant} in finished match {match_id}")]
    DepositRefFrozen {
        match_id: MatchId,
        participant: Address,
    },

    // =================================================================
    // Capacity Errors (4xx)
    // =================================================================
    #[error("EM_ERR_400: Match {match_id} is full ({capacity} participants)")]
    MatchFull { match_id: MatchId, capacity: u32 },

    // =================================================================
    // Payment Errors (5xx)
    // =================================================================
    #[error("EM_ERR_500: Obligation {obligation_id} already paid (tx {external_tx_ref})")]
    AlreadyPaid {
        obligation_id: ObligationId,
        external_tx_ref: String,
    },

    /// The external transfer failed (network, balance, destination).
    #[error("EM_ERR_501: Transfer for {obligation_id} failed: {reason}")]
    TransferFailed {
        obligation_id: ObligationId,
        reason: String,
    },

    /// No broadcast acknowledgement within the configured timeout.
    #[error("EM_ERR_502: Transfer for {obligation_id} timed out after {timeout_ms}ms")]
    TransferTimeout {
        obligation_id: ObligationId,
        timeout_ms: u64,
    },

    #[error("EM_ERR_503: Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Decimal, reason: String },

    // =================================================================
    // Determinism / Integrity Errors (6xx)
    // =================================================================
    /// The log no longer extends what was already folded.
    #[error("EM_ERR_600: Action log diverged at {at}: {reason}")]
    LogDiverged { at: LedgerSeq, reason: String },

    /// A contract invariant does not hold. Critical.
    #[error("EM_ERR_601: Invariant violation: {reason}")]
    InvariantViolation { reason: String },

    #[error("EM_ERR_602: Corrupt payout journal at line {line}: {reason}")]
    JournalCorrupt { line: usize, reason: String },

    /// The journal cannot be consulted, so whether a payment was already
    /// made is unknown.
    #[error("EM_ERR_603: Payout journal unavailable: {0}")]
    JournalUnavailable(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// The action's parameters are malformed.
    #[error("EM_ERR_900: Invalid {function}: {reason}")]
    InvalidAction {
        function: &'static str,
        reason: String,
    },

    #[error("EM_ERR_901: Invalid address {value}: {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("EM_ERR_902: Serialization error: {0}")]
    Serialization(String),

    #[error("EM_ERR_903: Configuration error: {0}")]
    Configuration(String),

    #[error("EM_ERR_904: I/O error: {0}")]
    Io(String),

    #[error("EM_ERR_905: Internal error: {0}")]
    Internal(String),
}

impl EscrowError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } | Self::SignatureInvalid { .. } | Self::NonceReplay { .. } => {
                ErrorKind::Authorization
            }
            Self::MatchNotFound(_)
            | Self::ParticipantNotFound { .. }
            | Self::ObligationNotFound(_) => ErrorKind::NotFound,
            Self::MatchAlreadyExists(_)
            | Self::InvalidTransition { .. }
            | Self::AlreadyJoined { .. }
            | Self::PayoutAlreadySet(_)
            | Self::DepositRefFrozen { .. } => ErrorKind::StateConflict,
            Self::MatchFull { .. } => ErrorKind::Capacity,
            Self::AlreadyPaid { .. } => ErrorKind::AlreadyPaid,
            Self::TransferFailed { .. } | Self::TransferTimeout { .. } => {
                ErrorKind::TransferExecution
            }
            Self::InvalidAmount { .. }
            | Self::InvalidAction { .. }
            | Self::InvalidAddress { .. } => ErrorKind::Validation,
            Self::LogDiverged { .. }
            | Self::InvariantViolation { .. }
            | Self::JournalCorrupt { .. }
            | Self::JournalUnavailable(_) => ErrorKind::Integrity,
            Self::Serialization(_) | Self::Configuration(_) | Self::Io(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the reducer produced this error (a rejected transition).
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Authorization
                | ErrorKind::NotFound
                | ErrorKind::StateConflict
                | ErrorKind::Capacity
                | ErrorKind::AlreadyPaid
                | ErrorKind::Validation
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, EscrowError>;

impl From<std::io::Error> for EscrowError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EscrowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
