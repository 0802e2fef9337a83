//! Integration test: invariants over reachable states.
//!
//! Drives the reducer with long pseudo-random action streams (seeded, so
//! failures reproduce) and checks after every step that the contract
//! invariants hold, that rejected actions change nothing, and that folding
//! the same stream twice produces the same state root.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use escrowmatch_reducer::{apply, check_invariants, compute_state_root, fold_entry};
use escrowmatch_types::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rust_decimal::Decimal;

const OWNER: u8 = 0xEE;
const MATCHES: [&str; 3] = ["alpha", "beta", "gamma"];

fn genesis() -> Genesis {
    Genesis {
        owner: Address::dummy(OWNER),
        custodial_account: "custody".into(),
    }
}

/// One random (caller, action) pair. Biased towards valid-looking actions
/// so that matches actually progress.
fn random_step(rng: &mut StdRng, state: &ContractState) -> (Address, Action) {
    let match_id = MatchId::new(MATCHES[rng.gen_range(0..MATCHES.len())]);
    let player = Address::dummy(rng.gen_range(1..=5));
    let caller_is_owner = rng.gen_bool(0.9);
    let owner = Address::dummy(OWNER);

    let action = match rng.gen_range(0..6) {
        0 => Action::CreateMatch {
            match_id,
            stake_amount: Decimal::new(rng.gen_range(1..100), 0),
            capacity: rng.gen_range(1..=4),
            metadata: BTreeMap::new(),
        },
        1 => return (player, Action::JoinMatch { match_id }),
        2 => Action::MarkDeposit {
            match_id,
            participant: player,
            deposit_ref: format!("dep-{}", rng.gen_range(0..3)),
        },
        3 => Action::StartMatch { match_id },
        4 => Action::SetPayout {
            match_id,
            winner: player,
        },
        _ => match state.obligations.first() {
            Some(ob) => Action::MarkPaid {
                obligation_id: ob.id,
                external_tx_ref: format!("tx-{}", rng.gen_range(0..3)),
            },
            None => Action::StartMatch { match_id },
        },
    };
    let caller = if caller_is_owner { owner } else { player };
    (caller, action)
}

fn build_log(seed: u64, steps: u64) -> Vec<AcceptedAction> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = ContractState::genesis(&genesis());
    let mut log = Vec::new();
    for seq in 0..steps {
        let (caller, action) = random_step(&mut rng, &state);
        let entry = AcceptedAction {
            seq: LedgerSeq(seq),
            envelope: ActionEnvelope {
                action,
                caller,
                nonce: seq,
                signature: vec![],
            },
            accepted_at: DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(seq as i64),
        };
        let _ = fold_entry(&mut state, &entry);
        log.push(entry);
    }
    log
}

#[test]
fn invariants_hold_on_every_reachable_state() {
    for seed in 0..20 {
        let log = build_log(seed, 400);
        let mut state = ContractState::genesis(&genesis());
        for entry in &log {
            let before = state.clone();
            match apply(&state, entry.action(), &entry.context()) {
                Ok(next) => state = next,
                Err(_) => assert_eq!(state, before, "rejected action must not mutate state"),
            }
            if let Err(e) = check_invariants(&state) {
                panic!("seed {seed} seq {}: {e}", entry.seq);
            }
            for m in state.matches.values() {
                assert!(m.participants.len() <= m.capacity as usize);
                assert_eq!(
                    m.status != MatchStatus::Waiting,
                    m.deposits_complete(),
                    "DEPOSITS_COMPLETE must be reached exactly when all seats deposited"
                );
            }
        }
    }
}

#[test]
fn replay_is_deterministic() {
    let log = build_log(42, 500);
    let fold = |log: &[AcceptedAction]| {
        let mut state = ContractState::genesis(&genesis());
        for entry in log {
            let _ = fold_entry(&mut state, entry);
        }
        state
    };
    let a = fold(&log);
    let b = fold(&log);
    assert_eq!(a, b);
    assert_eq!(compute_state_root(&a).unwrap(), compute_state_root(&b).unwrap());
    assert_eq!(a.applied, 500);
}

#[test]
fn obligations_paid_at_most_once() {
    let log = build_log(7, 600);
    let mut state = ContractState::genesis(&genesis());
    let mut paid_refs: BTreeMap<ObligationId, Option<String>> = BTreeMap::new();
    for entry in &log {
        let _ = fold_entry(&mut state, entry);
        for ob in &state.obligations {
            let seen = paid_refs.entry(ob.id).or_insert(None);
            if let Some(prev) = seen.as_ref() {
                assert_eq!(
                    Some(prev),
                    ob.external_tx_ref.as_ref(),
                    "obligation {} changed or lost its paid ref",
                    ob.id
                );
            } else {
                seen.clone_from(&ob.external_tx_ref);
            }
        }
    }
}
