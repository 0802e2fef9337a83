//! Action envelopes: the only way state changes.
//!
//! An [`Action`] names one transition and its parameters. It travels inside
//! an [`ActionEnvelope`] that binds it to a caller identity through an
//! ed25519 signature. Once the ledger orders it, it becomes an
//! [`AcceptedAction`] carrying its sequence number and ledger timestamp.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, EscrowError, LedgerSeq, MatchId, ObligationId, Result};

/// One named transition of the contract.
///
/// Wire form is tagged by `function`, e.g.
/// `{"function":"joinMatch","matchId":"m1"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Action {
    CreateMatch {
        match_id: MatchId,
        stake_amount: Decimal,
        capacity: u32,
        #[serde(default)]
        metadata: BTreeMap<String, String>,
    },
    JoinMatch {
        match_id: MatchId,
    },
    MarkDeposit {
        match_id: MatchId,
        participant: Address,
        deposit_ref: String,
    },
    StartMatch {
        match_id: MatchId,
    },
    SetPayout {
        match_id: MatchId,
        winner: Address,
    },
    MarkPaid {
        obligation_id: ObligationId,
        external_tx_ref: String,
    },
}

impl Action {
    /// The wire name of the function this action invokes.
    #[must_use]
    pub fn function(&self) -> &'static str {
        match self {
            Self::CreateMatch { .. } => "createMatch",
            Self::JoinMatch { .. } => "joinMatch",
            Self::MarkDeposit { .. } => "markDeposit",
            Self::StartMatch { .. } => "startMatch",
            Self::SetPayout { .. } => "setPayout",
            Self::MarkPaid { .. } => "markPaid",
        }
    }

    /// The match this action targets, if any.
    #[must_use]
    pub fn match_id(&self) -> Option<&MatchId> {
        match self {
            Self::CreateMatch { match_id, .. }
            | Self::JoinMatch { match_id }
            | Self::MarkDeposit { match_id, .. }
            | Self::StartMatch { match_id }
            | Self::SetPayout { match_id, .. } => Some(match_id),
            Self::MarkPaid { .. } => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.match_id() {
            Some(id) => write!(f, "{}({id})", self.function()),
            None => write!(f, "{}", self.function()),
        }
    }
}

/// A signed request to invoke one action as `caller`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEnvelope {
    pub action: Action,
    pub caller: Address,
    /// Strictly increasing per caller; the ledger rejects replays.
    pub nonce: u64,
    /// Ed25519 signature over [`ActionEnvelope::signing_payload`].
    pub signature: Vec<u8>,
}

impl ActionEnvelope {
    /// Canonical signing payload.
    ///
    /// Format: `"escrowmatch:action:v1:" || caller || nonce || json(action)`
    pub fn signing_payload(action: &Action, caller: &Address, nonce: u64) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(action)
            .map_err(|e| EscrowError::Serialization(e.to_string()))?;
        let mut payload = Vec::with_capacity(64 + body.len());
        payload.extend_from_slice(b"escrowmatch:action:v1:");
        payload.extend_from_slice(caller.as_bytes());
        payload.extend_from_slice(&nonce.to_le_bytes());
        payload.extend_from_slice(&body);
        Ok(payload)
    }

    /// Payload for this envelope's own fields.
    pub fn payload(&self) -> Result<Vec<u8>> {
        Self::signing_payload(&self.action, &self.caller, self.nonce)
    }
}

/// Everything the reducer may know about an action besides its body.
///
/// The reducer never reads a clock: `at` is the ledger's acceptance time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionContext {
    pub caller: Address,
    pub seq: LedgerSeq,
    pub at: DateTime<Utc>,
}

/// A ledger entry: an envelope at a fixed position in the total order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedAction {
    pub seq: LedgerSeq,
    pub envelope: ActionEnvelope,
    pub accepted_at: DateTime<Utc>,
}

impl AcceptedAction {
    #[must_use]
    pub fn context(&self) -> ActionContext {
        ActionContext {
            caller: self.envelope.caller,
            seq: self.seq,
            at: self.accepted_at,
        }
    }

    #[must_use]
    pub fn action(&self) -> &Action {
        &self.envelope.action
    }
}

/// What the ledger returns for an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub seq: LedgerSeq,
    pub function: String,
    pub accepted_at: DateTime<Utc>,
}
