//! Typed accessors over the journal and NVM.
//!
//! Fixes, in one place, the policy of which writes are journaled:
//! multi-field state-affecting updates (personalization, a PIN change, a
//! balance update) go through [`crate::journal`]; single-byte retry
//! counter bumps go direct to NVM and may tear (only "eventually reaches
//! zero" is relied upon, so a torn decrement is harmless).

use crate::journal::{self, JournalTransaction};
use crate::layout::{self, MAX_PERSO_LEN, PIN_LEN, PUK_LEN};
use crate::nvm::Nvm;

/// Thin typed view over a card's persistent state.
pub struct State<'a, N: Nvm> {
    nvm: &'a mut N,
}

impl<'a, N: Nvm> State<'a, N> {
    pub fn new(nvm: &'a mut N) -> Self {
        State { nvm }
    }

    /// Replay any pending journal transaction. Call once at boot, before
    /// the first APDU is processed.
    pub fn replay_journal(&mut self) {
        journal::commit(self.nvm);
    }

    pub fn perso_len(&self) -> u8 {
        self.nvm.read_byte(layout::ADDR_PERSO_LEN)
    }

    pub fn perso_blob(&self, out: &mut [u8]) {
        let len = core::cmp::min(self.perso_len() as usize, out.len());
        for i in 0..len {
            out[i] = self.nvm.read_byte(layout::ADDR_PERSO_BLOB + i as u16);
        }
    }

    pub fn puk(&self) -> [u8; PUK_LEN] {
        let mut out = [0u8; PUK_LEN];
        for (i, b) in out.iter_mut().enumerate() {
            *b = self.nvm.read_byte(layout::ADDR_PUK + i as u16);
        }
        out
    }

    pub fn pin(&self) -> [u8; PIN_LEN] {
        let mut out = [0u8; PIN_LEN];
        for (i, b) in out.iter_mut().enumerate() {
            *b = self.nvm.read_byte(layout::ADDR_PIN + i as u16);
        }
        out
    }

    pub fn pin_tries(&self) -> u8 {
        self.nvm.read_byte(layout::ADDR_PIN_TRIES)
    }

    /// Direct, single-byte write (not journaled).
    pub fn set_pin_tries(&mut self, v: u8) {
        self.nvm.write_byte(layout::ADDR_PIN_TRIES, v);
    }

    pub fn puk_tries(&self) -> u8 {
        self.nvm.read_byte(layout::ADDR_PUK_TRIES)
    }

    /// Direct, single-byte write (not journaled).
    pub fn set_puk_tries(&mut self, v: u8) {
        self.nvm.write_byte(layout::ADDR_PUK_TRIES, v);
    }

    pub fn ctr(&self) -> u16 {
        self.nvm.read_word(layout::ADDR_CTR)
    }

    pub fn balance(&self) -> u16 {
        self.nvm.read_word(layout::ADDR_BALANCE)
    }

    /// Stage a new PIN, resetting `pin_tries` to its maximum, as one
    /// atomic transaction (used by `CHANGE_PIN` and `RESET_PIN_BY_PUK`).
    pub fn stage_pin_reset(&mut self, new_pin: [u8; PIN_LEN]) {
        let mut txn = JournalTransaction::new();
        txn.add(layout::ADDR_PIN, &new_pin)
            .expect("PIN_LEN fits MAX_DATA");
        let max = [layout::PIN_TRY_MAX];
        txn.add(layout::ADDR_PIN_TRIES, &max)
            .expect("single byte fits MAX_DATA");
        journal::stage_and_commit(self.nvm, txn).expect("two entries fit MAX_OPS");
    }

    /// Stage a new PIN and reset both retry counters to their maxima
    /// (used by `RESET_PIN_BY_PUK`).
    pub fn stage_pin_reset_via_puk(&mut self, new_pin: [u8; PIN_LEN]) {
        let mut txn = JournalTransaction::new();
        txn.add(layout::ADDR_PIN, &new_pin)
            .expect("PIN_LEN fits MAX_DATA");
        let pin_max = [layout::PIN_TRY_MAX];
        txn.add(layout::ADDR_PIN_TRIES, &pin_max)
            .expect("single byte fits MAX_DATA");
        let puk_max = [layout::PUK_TRY_MAX];
        txn.add(layout::ADDR_PUK_TRIES, &puk_max)
            .expect("single byte fits MAX_DATA");
        journal::stage_and_commit(self.nvm, txn).expect("three entries fit MAX_OPS");
    }

    /// Durably advance the anti-replay counter alone, as its own atomic
    /// transaction. Callers must commit this before computing the
    /// balance mutation it authorizes: once this returns, a terminal
    /// resending the counter value it just used is rejected by the
    /// counter check itself, whether or not the balance update that
    /// follows ends up applying.
    pub fn stage_ctr_advance(&mut self, new_ctr: u16) {
        let ctr_bytes = new_ctr.to_le_bytes();
        let mut txn = JournalTransaction::new();
        txn.add(layout::ADDR_CTR, &ctr_bytes)
            .expect("2 bytes fit MAX_DATA");
        journal::stage_and_commit(self.nvm, txn).expect("one entry fits MAX_OPS");
    }

    /// Durably apply a new balance, as its own atomic transaction.
    pub fn stage_balance(&mut self, new_balance: u16) {
        let balance_bytes = new_balance.to_le_bytes();
        let mut txn = JournalTransaction::new();
        txn.add(layout::ADDR_BALANCE, &balance_bytes)
            .expect("2 bytes fit MAX_DATA");
        journal::stage_and_commit(self.nvm, txn).expect("one entry fits MAX_OPS");
    }

    /// Factory-style reset: new personalization, derived PUK, default
    /// PIN, maxed retry counters, zeroed counter and balance. All eight
    /// updates apply atomically or none do.
    pub fn stage_personalization(
        &mut self,
        len: u8,
        perso: &[u8],
        puk: [u8; PUK_LEN],
    ) {
        debug_assert!(perso.len() <= MAX_PERSO_LEN);
        let len_bytes = [len];
        let pin_tries = [layout::PIN_TRY_MAX];
        let puk_tries = [layout::PUK_TRY_MAX];
        let ctr0 = 0u16.to_le_bytes();
        let balance0 = 0u16.to_le_bytes();

        let mut txn = JournalTransaction::new();
        txn.add(layout::ADDR_PERSO_LEN, &len_bytes)
            .expect("1 byte fits MAX_DATA");
        txn.add(layout::ADDR_PERSO_BLOB, perso)
            .expect("perso fits MAX_DATA");
        txn.add(layout::ADDR_PUK, &puk).expect("PUK_LEN fits MAX_DATA");
        txn.add(layout::ADDR_PIN, &layout::DEFAULT_PIN)
            .expect("PIN_LEN fits MAX_DATA");
        txn.add(layout::ADDR_PIN_TRIES, &pin_tries)
            .expect("1 byte fits MAX_DATA");
        txn.add(layout::ADDR_PUK_TRIES, &puk_tries)
            .expect("1 byte fits MAX_DATA");
        txn.add(layout::ADDR_CTR, &ctr0).expect("2 bytes fit MAX_DATA");
        txn.add(layout::ADDR_BALANCE, &balance0)
            .expect("2 bytes fit MAX_DATA");
        journal::stage_and_commit(self.nvm, txn).expect("eight entries fit MAX_OPS");
    }
}
