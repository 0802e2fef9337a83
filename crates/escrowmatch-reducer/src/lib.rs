//! # escrowmatch-reducer
//!
//! **The contract core: a pure, deterministic state machine.**
//!
//! The reducer takes the current `ContractState`, one action, and the
//! caller identity, and returns either the next state or a tagged error.
//! It has:
//!
//! - **Zero side effects**: no storage, no clock, no value transfers
//! - **Deterministic output**: same log → same state on every replica
//! - **All-or-nothing transitions**: a rejected action changes nothing
//! - **Explicit authorization**: every function declares the capability it needs

pub mod authorization;
pub mod determinism;
pub mod invariants;
pub mod reducer;

pub use authorization::{authorize, required_capability, resolve_role};
pub use determinism::{compute_state_root, verify_state_root};
pub use invariants::check_invariants;
pub use reducer::{apply, apply_in_place, fold_entry};
