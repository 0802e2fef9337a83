//! Determinism verification utilities for cross-replica consistency.
//!
//! Every party folding the same action log must hold the exact same
//! `ContractState`. The `state_root` is a SHA-256 digest over the canonical
//! JSON encoding of the state (all maps are ordered), so replicas and
//! auditors can compare 32 bytes instead of whole states.

use escrowmatch_types::{ContractState, Result};
use sha2::{Digest, Sha256};

/// Compute the state root of `state`.
pub fn compute_state_root(state: &ContractState) -> Result<[u8; 32]> {
    let body = serde_json::to_vec(state)?;
    let mut hasher = Sha256::new();
    hasher.update(b"escrowmatch:state_root:v1:");
    hasher.update((body.len() as u64).to_le_bytes());
    hasher.update(&body);

    let result = hasher.finalize();
    let mut root = [0u8; 32];
    root.copy_from_slice(&result);
    Ok(root)
}

/// Recompute the root of `state` and compare with `expected_root`.
pub fn verify_state_root(state: &ContractState, expected_root: &[u8; 32]) -> Result<bool> {
    Ok(compute_state_root(state)? == *expected_root)
}

#[cfg(test)]
mod tests {
    use escrowmatch_types::{Address, Genesis};

    use super::*;

    fn genesis_state(owner: u8) -> ContractState {
        ContractState::genesis(&Genesis {
            owner: Address::dummy(owner),
            custodial_account: "custody".into(),
        })
    }

    #[test]
    fn same_state_same_root() {
        let a = compute_state_root(&genesis_state(1)).unwrap();
        let b = compute_state_root(&genesis_state(1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_state_different_root() {
        let a = compute_state_root(&genesis_state(1)).unwrap();
        let b = compute_state_root(&genesis_state(2)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_correct_and_wrong_root() {
        let state = genesis_state(1);
        let root = compute_state_root(&state).unwrap();
        assert!(verify_state_root(&state, &root).unwrap());
        assert!(!verify_state_root(&state, &[0xAB; 32]).unwrap());
    }
}
