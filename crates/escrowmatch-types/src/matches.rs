//! Match (campaign) model.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐ all deposited  ┌───────────────────┐ startMatch ┌─────────┐ setPayout ┌──────────┐
//!   │ WAITING ├───────────────▶│ DEPOSITS_COMPLETE ├───────────▶│ STARTED ├──────────▶│ FINISHED │
//!   └─────────┘  & full        └───────────────────┘            └─────────┘           └──────────┘
//! ```
//!
//! Transitions are monotonic. `FINISHED` is terminal; matches are never
//! deleted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, MatchId};

/// Lifecycle status of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchStatus {
    /// Accepting joins and deposit confirmations.
    Waiting,
    /// Full, and every participant's deposit is confirmed.
    DepositsComplete,
    /// The owner started the match.
    Started,
    /// A winner was recorded and a payout obligation created. Terminal.
    Finished,
}

impl MatchStatus {
    /// Can a match move from this status to `target`?
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::DepositsComplete)
                | (Self::DepositsComplete, Self::Started)
                | (Self::Started, Self::Finished)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Finished
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "WAITING"),
            Self::DepositsComplete => write!(f, "DEPOSITS_COMPLETE"),
            Self::Started => write!(f, "STARTED"),
            Self::Finished => write!(f, "FINISHED"),
        }
    }
}

/// Per-participant state inside a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantState {
    /// Whether the owner confirmed this participant's deposit.
    pub deposited: bool,
    /// External reference of the funding transaction, once confirmed.
    pub deposit_ref: Option<String>,
    /// Ledger timestamp of the join action.
    pub joined_at: DateTime<Utc>,
}

impl ParticipantState {
    #[must_use]
    pub fn joined(at: DateTime<Utc>) -> Self {
        Self {
            deposited: false,
            deposit_ref: None,
            joined_at: at,
        }
    }
}

/// A multi-party escrow match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    /// Stake each participant deposits (or the per-seat reward amount).
    pub stake: Decimal,
    /// Maximum number of participants.
    pub capacity: u32,
    pub participants: BTreeMap<Address, ParticipantState>,
    pub status: MatchStatus,
    pub winner: Option<Address>,
    /// Free-form owner-supplied labels. Opaque to the reducer.
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Match {
    #[must_use]
    pub fn new(
        id: MatchId,
        stake: Decimal,
        capacity: u32,
        metadata: BTreeMap<String, String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            stake,
            capacity,
            participants: BTreeMap::new(),
            status: MatchStatus::Waiting,
            winner: None,
            metadata,
            created_at,
        }
    }

    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.capacity as usize
    }

    #[must_use]
    pub fn is_participant(&self, addr: &Address) -> bool {
        self.participants.contains_key(addr)
    }

    /// Every seat is taken and every deposit is confirmed.
    #[must_use]
    pub fn deposits_complete(&self) -> bool {
        self.participants.len() == self.capacity as usize
            && self.participants.values().all(|p| p.deposited)
    }

    /// The whole pot: stake times participant count. `None` on overflow.
    #[must_use]
    pub fn pot(&self) -> Option<Decimal> {
        self.stake
            .checked_mul(Decimal::from(self.participants.len() as u64))
    }
}
