//! Whole-state invariant checker.
//!
//! The reducer maintains these invariants transition by transition; this
//! module re-verifies them over an entire materialized state. The relayer
//! runs it before paying anything and refuses to proceed on a violation.

use std::collections::HashSet;

use escrowmatch_types::{ContractState, EscrowError, MatchStatus, Result};
use rust_decimal::Decimal;

/// Verify every contract invariant, reporting the first violation.
///
/// # Errors
/// Returns [`EscrowError::InvariantViolation`] describing what broke.
pub fn check_invariants(state: &ContractState) -> Result<()> {
    for (key, m) in &state.matches {
        if *key != m.id {
            return violation(format!("match keyed {key} carries id {}", m.id));
        }
        if m.participants.len() > m.capacity as usize {
            return violation(format!(
                "match {key} has {} participants, capacity {}",
                m.participants.len(),
                m.capacity
            ));
        }
        match m.status {
            MatchStatus::Waiting => {
                if m.deposits_complete() {
                    return violation(format!("match {key} is WAITING with all deposits confirmed"));
                }
            }
            MatchStatus::DepositsComplete | MatchStatus::Started | MatchStatus::Finished => {
                if !m.deposits_complete() {
                    return violation(format!(
                        "match {key} is {} without complete deposits",
                        m.status
                    ));
                }
            }
        }
        match (m.status, m.winner) {
            (MatchStatus::Finished, Some(winner)) => {
                if !m.is_participant(&winner) {
                    return violation(format!("match {key} winner is not a participant"));
                }
            }
            (MatchStatus::Finished, None) => {
                return violation(format!("match {key} is FINISHED without a winner"));
            }
            (_, Some(_)) => {
                return violation(format!("match {key} has a winner while {}", m.status));
            }
            (_, None) => {}
        }
        for (addr, seat) in &m.participants {
            if seat.deposited != seat.deposit_ref.is_some() {
                return violation(format!(
                    "participant {} in match {key} has deposited={} but deposit_ref={:?}",
                    addr.short(),
                    seat.deposited,
                    seat.deposit_ref
                ));
            }
        }
    }

    let mut ids = HashSet::new();
    let mut unpaid = HashSet::new();
    for ob in &state.obligations {
        if !ids.insert(ob.id) {
            return violation(format!("duplicate obligation id {}", ob.id));
        }
        if ob.paid != ob.external_tx_ref.is_some() || ob.paid != ob.paid_at.is_some() {
            return violation(format!(
                "obligation {} has paid={} but external_tx_ref/paid_at disagree",
                ob.id, ob.paid
            ));
        }
        if ob.amount <= Decimal::ZERO {
            return violation(format!("obligation {} has non-positive amount", ob.id));
        }
        let Some(m) = state.matches.get(&ob.match_id) else {
            return violation(format!("obligation {} references unknown match", ob.id));
        };
        if m.status != MatchStatus::Finished || m.winner != Some(ob.recipient) {
            return violation(format!(
                "obligation {} does not pay the winner of a finished match",
                ob.id
            ));
        }
        if !ob.paid && !unpaid.insert((ob.recipient, ob.match_id.clone())) {
            return violation(format!(
                "more than one unpaid obligation for match {}",
                ob.match_id
            ));
        }
    }

    Ok(())
}

fn violation(reason: String) -> Result<()> {
    Err(EscrowError::InvariantViolation { reason })
}
