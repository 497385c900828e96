//! Crash-injection and idempotent-replay properties of the journal.
//!
//! `TearableNvm` lets these tests land a simulated power loss at any byte
//! write inside a `stage`/`commit` pair. The journal's only promise is
//! that every such crash is observed, after a reboot's replay, as either
//! the transaction never having happened or having happened completely
//! (never a partial write).

mod support;

use proptest::prelude::*;
use purse_card::journal;
use purse_card::layout;
use purse_card::nvm::Nvm;
use purse_card::state::State;
use support::TearableNvm;

const OLD_BALANCE: u16 = 0x1000;
const OLD_CTR: u16 = 7;
const NEW_BALANCE: u16 = 0x2222;
const NEW_CTR: u16 = OLD_CTR + 1;

/// A budget comfortably larger than any write count a 1-entry transaction
/// can reach, so the sweeps below cover every crash point.
const BUDGET_UPPER_BOUND: usize = 40;

fn baseline() -> support::ArrayNvm {
    let mut nvm = TearableNvm::new();
    {
        let mut state = State::new(&mut nvm);
        state.stage_personalization(0, &[], [b'0'; 6]);
    }
    // stage_personalization zeroes balance/ctr; bump them to distinguishable
    // nonzero values via uncrashed updates so "old" != 0.
    {
        let mut state = State::new(&mut nvm);
        state.stage_ctr_advance(OLD_CTR);
        state.stage_balance(OLD_BALANCE);
    }
    nvm.snapshot()
}

fn reboot_and_read(snapshot: support::ArrayNvm) -> (u16, u16) {
    let mut rebooted = TearableNvm::resume_from(snapshot, None);
    journal::commit(&mut rebooted);
    let state = State::new(&mut rebooted);
    (state.balance(), state.ctr())
}

#[test]
fn ctr_advance_is_all_or_nothing_under_any_crash_point() {
    let base = baseline();

    for budget in 0..=BUDGET_UPPER_BOUND {
        let mut nvm = TearableNvm::resume_from(base.clone(), Some(budget));
        {
            let mut state = State::new(&mut nvm);
            state.stage_ctr_advance(NEW_CTR);
        }
        let torn_snapshot = nvm.snapshot();

        let (balance, ctr) = reboot_and_read(torn_snapshot);

        assert_eq!(balance, OLD_BALANCE, "budget {budget}: ctr's own crash must not touch balance");
        let rolled_back = ctr == OLD_CTR;
        let fully_applied = ctr == NEW_CTR;
        assert!(
            rolled_back || fully_applied,
            "budget {budget}: ctr={ctr} is neither the old nor the new committed value"
        );
    }
}

#[test]
fn balance_update_is_all_or_nothing_under_any_crash_point() {
    let base = baseline();

    for budget in 0..=BUDGET_UPPER_BOUND {
        let mut nvm = TearableNvm::resume_from(base.clone(), Some(budget));
        {
            let mut state = State::new(&mut nvm);
            state.stage_balance(NEW_BALANCE);
        }
        let torn_snapshot = nvm.snapshot();

        let (balance, ctr) = reboot_and_read(torn_snapshot);

        assert_eq!(ctr, OLD_CTR, "budget {budget}: balance's own crash must not touch ctr");
        let rolled_back = balance == OLD_BALANCE;
        let fully_applied = balance == NEW_BALANCE;
        assert!(
            rolled_back || fully_applied,
            "budget {budget}: balance={balance:#x} is neither the old nor the new committed value"
        );
    }
}

#[test]
fn replay_is_idempotent() {
    let mut nvm = TearableNvm::resume_from(baseline(), None);
    {
        let mut state = State::new(&mut nvm);
        state.stage_ctr_advance(NEW_CTR);
        state.stage_balance(NEW_BALANCE);
    }
    // Both updates already committed once; replaying again must be a
    // no-op (journal observed EMPTY).
    journal::commit(&mut nvm);
    journal::commit(&mut nvm);

    let state = State::new(&mut nvm);
    assert_eq!(state.balance(), NEW_BALANCE);
    assert_eq!(state.ctr(), NEW_CTR);
}

#[test]
fn uninterrupted_journal_state_ends_empty() {
    let mut nvm = TearableNvm::resume_from(baseline(), None);
    {
        let mut state = State::new(&mut nvm);
        state.stage_balance(NEW_BALANCE);
    }
    assert_ne!(
        nvm.read_byte(layout::ADDR_JOURNAL_STATE),
        layout::JOURNAL_PENDING
    );
}

proptest! {
    /// Same property as the exhaustive sweeps above, but driven by
    /// proptest over the 8-entry `INTRO_PERSO` transaction (the widest
    /// the journal supports) instead of a single-entry monetary one.
    #[test]
    fn personalization_is_all_or_nothing_under_any_crash_point(
        budget in 0..BUDGET_UPPER_BOUND * 2,
        perso in proptest::collection::vec(any::<u8>(), 0..=layout::MAX_PERSO_LEN),
    ) {
        let mut nvm = TearableNvm::crash_after(budget);
        let puk = purse_card::auth::derive_puk(&perso);
        {
            let mut state = State::new(&mut nvm);
            state.stage_personalization(perso.len() as u8, &perso, puk);
        }
        let torn = nvm.snapshot();

        let mut rebooted = TearableNvm::resume_from(torn, None);
        journal::commit(&mut rebooted);
        let state = State::new(&mut rebooted);

        let len = state.perso_len();
        let rolled_back = len == 0 && state.balance() == 0 && state.ctr() == 0;
        let applied = len as usize == perso.len() && state.balance() == 0 && state.ctr() == 0;
        prop_assert!(rolled_back || applied);
    }
}
