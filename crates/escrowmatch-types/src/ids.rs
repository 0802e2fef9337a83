//! Identifiers used throughout EscrowMatch.
//!
//! Every identifier that ends up inside `ContractState` must be derivable
//! from the action log alone, so replicas replaying the same log agree on
//! it. In particular [`ObligationId`] is derived from the ledger position
//! of the `setPayout` action rather than drawn at random.

use std::{fmt, str::FromStr};

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EscrowError, Result};

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// An identity on the ledger: the raw ed25519 verifying key (32 bytes).
///
/// Serialized as lowercase hex so it can key JSON maps.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 32]);

impl Address {
    #[must_use]
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s).map_err(|e| EscrowError::InvalidAddress {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        let bytes: [u8; 32] = raw.try_into().map_err(|_| EscrowError::InvalidAddress {
            value: s.to_string(),
            reason: "expected 32 bytes".to_string(),
        })?;
        Ok(Self(bytes))
    }

    /// Recover the ed25519 key this address names.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).map_err(|e| EscrowError::InvalidAddress {
            value: self.to_hex(),
            reason: e.to_string(),
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First four bytes in hex, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short())
    }
}

impl FromStr for Address {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Address {
    type Error = EscrowError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_hex()
    }
}

// ---------------------------------------------------------------------------
// MatchId
// ---------------------------------------------------------------------------

/// Owner-chosen match (or campaign) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub String);

impl MatchId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MatchId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// LedgerSeq
// ---------------------------------------------------------------------------

/// Zero-based position of an accepted action in the ledger log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerSeq(pub u64);

impl LedgerSeq {
    pub const GENESIS: Self = Self(0);

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for LedgerSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ObligationId
// ---------------------------------------------------------------------------

/// Identifier of a payout obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ObligationId(pub Uuid);

impl ObligationId {
    /// Deterministic `ObligationId` from the match and the ledger position
    /// of the `setPayout` action that created it.
    ///
    /// Every replica derives the **same** ID for the same log.
    #[must_use]
    pub fn deterministic(match_id: &MatchId, seq: LedgerSeq) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"escrowmatch:obligation_id:v1:");
        hasher.update((match_id.0.len() as u64).to_le_bytes());
        hasher.update(match_id.0.as_bytes());
        hasher.update(seq.0.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for ObligationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ob:{}", self.0)
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Address {
    /// Fixed address filled with `tag`. Not a valid curve point in general;
    /// only for tests that never verify signatures.
    #[must_use]
    pub fn dummy(tag: u8) -> Self {
        Self([tag; 32])
    }
}
