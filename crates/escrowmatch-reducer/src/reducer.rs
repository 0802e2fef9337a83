//! The contract core: `(state, action, caller) -> state | error`.
//!
//! Every transition checks all of its preconditions before its first
//! write, so a failed transition leaves the state untouched. That is what
//! lets [`apply_in_place`] be used by the materializer without cloning;
//! [`apply`] is the clone-and-apply form for callers that want a new value.
//!
//! The reducer never reads a clock and never moves funds. Timestamps and
//! sequence numbers come from [`ActionContext`].

use std::collections::BTreeMap;

use escrowmatch_types::{
    constants, AcceptedAction, Action, ActionContext, Address, ContractState, EscrowError, Match,
    MatchId, MatchStatus, ObligationId, ParticipantState, PayoutObligation, Result,
};
use rust_decimal::Decimal;

use crate::authorization;

/// Apply `action` as `ctx.caller` and return the resulting state.
///
/// On error `state` is not modified and no new state is produced.
pub fn apply(state: &ContractState, action: &Action, ctx: &ActionContext) -> Result<ContractState> {
    let mut next = state.clone();
    apply_in_place(&mut next, action, ctx)?;
    Ok(next)
}

/// Apply `action` to `state` in place. All-or-nothing.
pub fn apply_in_place(state: &mut ContractState, action: &Action, ctx: &ActionContext) -> Result<()> {
    authorization::authorize(state, action, &ctx.caller)?;

    match action {
        Action::CreateMatch {
            match_id,
            stake_amount,
            capacity,
            metadata,
        } => create_match(state, ctx, match_id, *stake_amount, *capacity, metadata),
        Action::JoinMatch { match_id } => join_match(state, ctx, match_id),
        Action::MarkDeposit {
            match_id,
            participant,
            deposit_ref,
        } => mark_deposit(state, match_id, participant, deposit_ref),
        Action::StartMatch { match_id } => start_match(state, match_id),
        Action::SetPayout { match_id, winner } => set_payout(state, ctx, match_id, winner),
        Action::MarkPaid {
            obligation_id,
            external_tx_ref,
        } => mark_paid(state, ctx, obligation_id, external_tx_ref),
    }
}

/// Fold one ledger entry into `state`, maintaining the fold counters.
///
/// A rejected entry still advances `applied` and bumps `rejected`; the
/// rejection is returned so callers can log it.
pub fn fold_entry(state: &mut ContractState, entry: &AcceptedAction) -> Result<()> {
    let outcome = apply_in_place(state, entry.action(), &entry.context());
    state.applied += 1;
    if outcome.is_err() {
        state.rejected += 1;
    }
    outcome
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

fn create_match(
    state: &mut ContractState,
    ctx: &ActionContext,
    match_id: &MatchId,
    stake: Decimal,
    capacity: u32,
    metadata: &BTreeMap<String, String>,
) -> Result<()> {
    const FN: &str = "createMatch";
    if match_id.0.trim().is_empty() || match_id.0.len() > constants::MAX_MATCH_ID_LEN {
        return Err(invalid(FN, format!(
            "match id must be 1..={} bytes",
            constants::MAX_MATCH_ID_LEN
        )));
    }
    if capacity == 0 || capacity > constants::MAX_MATCH_CAPACITY {
        return Err(invalid(FN, format!(
            "capacity {capacity} outside 1..={}",
            constants::MAX_MATCH_CAPACITY
        )));
    }
    if stake <= Decimal::ZERO {
        return Err(EscrowError::InvalidAmount {
            amount: stake,
            reason: "stake must be positive".into(),
        });
    }
    if metadata.len() > constants::MAX_METADATA_ENTRIES {
        return Err(invalid(FN, format!(
            "at most {} metadata entries",
            constants::MAX_METADATA_ENTRIES
        )));
    }
    if state.matches.contains_key(match_id) {
        return Err(EscrowError::MatchAlreadyExists(match_id.clone()));
    }

    state.matches.insert(
        match_id.clone(),
        Match::new(match_id.clone(), stake, capacity, metadata.clone(), ctx.at),
    );
    tracing::debug!(match_id = %match_id, %stake, capacity, "Match created");
    Ok(())
}

fn join_match(state: &mut ContractState, ctx: &ActionContext, match_id: &MatchId) -> Result<()> {
    let m = state
        .matches
        .get_mut(match_id)
        .ok_or_else(|| EscrowError::MatchNotFound(match_id.clone()))?;

    if m.is_participant(&ctx.caller) {
        return Err(EscrowError::AlreadyJoined {
            match_id: match_id.clone(),
            participant: ctx.caller,
        });
    }
    if m.is_full() {
        return Err(EscrowError::MatchFull {
            match_id: match_id.clone(),
            capacity: m.capacity,
        });
    }
    if m.status != MatchStatus::Waiting {
        return Err(EscrowError::InvalidTransition {
            match_id: match_id.clone(),
            expected: MatchStatus::Waiting,
            actual: m.status,
        });
    }

    m.participants
        .insert(ctx.caller, ParticipantState::joined(ctx.at));
    tracing::debug!(
        match_id = %match_id,
        participant = %ctx.caller.short(),
        seats = m.participants.len(),
        capacity = m.capacity,
        "Participant joined"
    );
    Ok(())
}

fn mark_deposit(
    state: &mut ContractState,
    match_id: &MatchId,
    participant: &Address,
    deposit_ref: &str,
) -> Result<()> {
    validate_external_ref("markDeposit", "depositRef", deposit_ref)?;

    let m = state
        .matches
        .get_mut(match_id)
        .ok_or_else(|| EscrowError::MatchNotFound(match_id.clone()))?;
    let status = m.status;
    let seat = m
        .participants
        .get_mut(participant)
        .ok_or_else(|| EscrowError::ParticipantNotFound {
            match_id: match_id.clone(),
            participant: *participant,
        })?;

    // Re-confirming the same deposit is a no-op in every status.
    if seat.deposited && seat.deposit_ref.as_deref() == Some(deposit_ref) {
        return Ok(());
    }
    if status.is_terminal() {
        return Err(EscrowError::DepositRefFrozen {
            match_id: match_id.clone(),
            participant: *participant,
        });
    }

    seat.deposited = true;
    seat.deposit_ref = Some(deposit_ref.to_string());

    if m.status.can_transition_to(MatchStatus::DepositsComplete) && m.deposits_complete() {
        m.status = MatchStatus::DepositsComplete;
        tracing::debug!(match_id = %match_id, "All deposits confirmed");
    }
    Ok(())
}

fn start_match(state: &mut ContractState, match_id: &MatchId) -> Result<()> {
    let m = state
        .matches
        .get_mut(match_id)
        .ok_or_else(|| EscrowError::MatchNotFound(match_id.clone()))?;

    if !m.status.can_transition_to(MatchStatus::Started) {
        return Err(EscrowError::InvalidTransition {
            match_id: match_id.clone(),
            expected: MatchStatus::DepositsComplete,
            actual: m.status,
        });
    }

    m.status = MatchStatus::Started;
    Ok(())
}

fn set_payout(
    state: &mut ContractState,
    ctx: &ActionContext,
    match_id: &MatchId,
    winner: &Address,
) -> Result<()> {
    let m = state
        .matches
        .get(match_id)
        .ok_or_else(|| EscrowError::MatchNotFound(match_id.clone()))?;

    if m.status.is_terminal() {
        return Err(EscrowError::PayoutAlreadySet(match_id.clone()));
    }
    if !m.status.can_transition_to(MatchStatus::Finished) {
        return Err(EscrowError::InvalidTransition {
            match_id: match_id.clone(),
            expected: MatchStatus::Started,
            actual: m.status,
        });
    }
    if !m.is_participant(winner) {
        return Err(EscrowError::ParticipantNotFound {
            match_id: match_id.clone(),
            participant: *winner,
        });
    }
    let amount = m.pot().ok_or_else(|| EscrowError::InvalidAmount {
        amount: m.stake,
        reason: "pot overflows".into(),
    })?;
    if amount <= Decimal::ZERO {
        return Err(EscrowError::InvalidAmount {
            amount,
            reason: "payout must be positive".into(),
        });
    }
    if state.unpaid_obligation_for(winner, match_id).is_some() {
        return Err(EscrowError::PayoutAlreadySet(match_id.clone()));
    }

    let obligation = PayoutObligation::new(
        ObligationId::deterministic(match_id, ctx.seq),
        *winner,
        amount,
        match_id.clone(),
        ctx.at,
    );
    tracing::debug!(
        match_id = %match_id,
        obligation = %obligation.id,
        winner = %winner.short(),
        %amount,
        "Payout obligation created"
    );
    state.obligations.push(obligation);

    // Lookup above proved presence; re-borrow mutably for the status write.
    if let Some(m) = state.matches.get_mut(match_id) {
        m.winner = Some(*winner);
        m.status = MatchStatus::Finished;
    }
    Ok(())
}

fn mark_paid(
    state: &mut ContractState,
    ctx: &ActionContext,
    obligation_id: &ObligationId,
    external_tx_ref: &str,
) -> Result<()> {
    validate_external_ref("markPaid", "externalTxRef", external_tx_ref)?;

    let obligation = state
        .obligation_mut(obligation_id)
        .ok_or(EscrowError::ObligationNotFound(*obligation_id))?;
    obligation.mark_paid(external_tx_ref.to_string(), ctx.at)?;
    tracing::debug!(obligation = %obligation_id, tx = external_tx_ref, "Obligation marked paid");
    Ok(())
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn validate_external_ref(function: &'static str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(function, format!("{field} must not be empty")));
    }
    if value.len() > constants::MAX_EXTERNAL_REF_LEN {
        return Err(invalid(function, format!(
            "{field} longer than {} bytes",
            constants::MAX_EXTERNAL_REF_LEN
        )));
    }
    Ok(())
}

fn invalid(function: &'static str, reason: String) -> EscrowError {
    EscrowError::InvalidAction { function, reason }
}
