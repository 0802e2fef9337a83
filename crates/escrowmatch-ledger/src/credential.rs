//! Caller credentials: ed25519 keys that bind envelopes to identities.
//!
//! The address of a credential is its verifying key, so a verified
//! signature is all the ledger needs to know who the caller is.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use escrowmatch_types::{Action, ActionEnvelope, Address, EscrowError, Result};
use rand::{CryptoRng, RngCore};

/// A signing identity.
pub struct Credential {
    signing_key: SigningKey,
    address: Address,
}

impl Credential {
    /// Generate a fresh credential.
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        Self::from_signing_key(SigningKey::generate(rng))
    }

    /// Restore a credential from its 32-byte secret.
    #[must_use]
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(secret))
    }

    /// Restore a credential from a hex-encoded 32-byte secret.
    pub fn from_secret_hex(secret: &str) -> Result<Self> {
        let raw = hex::decode(secret.trim())
            .map_err(|e| EscrowError::Configuration(format!("credential secret: {e}")))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| EscrowError::Configuration("credential secret must be 32 bytes".into()))?;
        Ok(Self::from_secret_bytes(&bytes))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = Address::from_verifying_key(&signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign `action` under `nonce`, producing a submittable envelope.
    pub fn sign(&self, action: Action, nonce: u64) -> Result<ActionEnvelope> {
        let payload = ActionEnvelope::signing_payload(&action, &self.address, nonce)?;
        let signature = self.signing_key.sign(&payload);
        Ok(ActionEnvelope {
            action,
            caller: self.address,
            nonce,
            signature: signature.to_bytes().to_vec(),
        })
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Verify that `envelope` was signed by the key its `caller` names.
///
/// # Errors
/// Returns [`EscrowError::SignatureInvalid`] for a malformed or wrong
/// signature, or [`EscrowError::InvalidAddress`] when the caller is not a
/// valid ed25519 key.
pub fn verify_envelope(envelope: &ActionEnvelope) -> Result<()> {
    let key = envelope.caller.verifying_key()?;
    let signature = Signature::from_slice(&envelope.signature).map_err(|_| {
        EscrowError::SignatureInvalid {
            caller: envelope.caller,
        }
    })?;
    let payload = envelope.payload()?;
    key.verify(&payload, &signature)
        .map_err(|_| EscrowError::SignatureInvalid {
            caller: envelope.caller,
        })
}
