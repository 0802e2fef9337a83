//! Explicit capability check, evaluated before any mutation.
//!
//! Each function declares the [`Capability`] it demands. The caller's
//! [`Role`] is resolved against the current state: the owner address is
//! `Owner`, every other address is a `Participant`. A relayer submitting
//! with the owner credential resolves to `Owner`.

use escrowmatch_types::{Action, Address, Capability, ContractState, EscrowError, Result, Role};

/// The capability `action` requires of its caller.
#[must_use]
pub fn required_capability(action: &Action) -> Capability {
    match action {
        Action::JoinMatch { .. } => Capability::SelfParticipant,
        Action::CreateMatch { .. }
        | Action::MarkDeposit { .. }
        | Action::StartMatch { .. }
        | Action::SetPayout { .. }
        | Action::MarkPaid { .. } => Capability::OwnerOnly,
    }
}

/// Resolve what role `caller` holds in `state`.
#[must_use]
pub fn resolve_role(state: &ContractState, caller: &Address) -> Role {
    if state.is_owner(caller) {
        Role::Owner
    } else {
        Role::Participant
    }
}

/// Check that `caller` may invoke `action`.
///
/// For [`Capability::SelfParticipant`] the participant is the caller by
/// construction: `joinMatch` carries no participant field, so a caller can
/// only ever claim its own seat.
///
/// # Errors
/// Returns [`EscrowError::Unauthorized`] when the capability is missing.
pub fn authorize(state: &ContractState, action: &Action, caller: &Address) -> Result<Role> {
    let role = resolve_role(state, caller);
    let required = required_capability(action);
    let allowed = match required {
        Capability::OwnerOnly => role.acts_as_owner(),
        Capability::SelfParticipant => true,
    };
    if allowed {
        Ok(role)
    } else {
        Err(EscrowError::Unauthorized {
            function: action.function(),
            caller: *caller,
            required,
        })
    }
}
