//! Identity roles and the capabilities each action requires.

use serde::{Deserialize, Serialize};

/// Who a caller is, relative to the contract.
///
/// `Relayer` is not a distinct key: the relayer submits with the owner's
/// credential and is indistinguishable from `Owner` on the ledger. The
/// variant exists so submitters can label their traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Participant,
    Relayer,
}

impl Role {
    /// Whether this role carries owner authority.
    #[must_use]
    pub fn acts_as_owner(self) -> bool {
        matches!(self, Self::Owner | Self::Relayer)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "OWNER"),
            Self::Participant => write!(f, "PARTICIPANT"),
            Self::Relayer => write!(f, "RELAYER"),
        }
    }
}

/// The authority an action demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Caller must be the contract owner.
    OwnerOnly,
    /// Caller acts on its own seat; the participant is the caller.
    SelfParticipant,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OwnerOnly => write!(f, "owner"),
            Self::SelfParticipant => write!(f, "self-participant"),
        }
    }
}
