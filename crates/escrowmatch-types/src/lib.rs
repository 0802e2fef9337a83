//! # escrowmatch-types
//!
//! Shared types, errors, and configuration for **EscrowMatch**.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`Address`], [`MatchId`], [`ObligationId`], [`LedgerSeq`]
//! - **Match model**: [`Match`], [`MatchStatus`], [`ParticipantState`]
//! - **Obligation model**: [`PayoutObligation`]
//! - **Contract state**: [`ContractState`], [`Genesis`], [`StateSummary`]
//! - **Actions**: [`Action`], [`ActionEnvelope`], [`AcceptedAction`], [`ActionContext`]
//! - **Roles**: [`Role`], [`Capability`]
//! - **Configuration**: [`LedgerConfig`], [`RelayerConfig`]
//! - **Errors**: [`EscrowError`] with `EM_ERR_` prefix codes, [`ErrorKind`]
//! - **Constants**: system-wide limits and defaults

pub mod action;
pub mod config;
pub mod constants;
pub mod contract;
pub mod error;
pub mod ids;
pub mod matches;
pub mod obligation;
pub mod role;

pub use action::*;
pub use config::*;
pub use contract::*;
pub use error::*;
pub use ids::*;
pub use matches::*;
pub use obligation::*;
pub use role::*;

// Constants are accessed via `escrowmatch_types::constants::FOO`
// (not re-exported to avoid name collisions).
