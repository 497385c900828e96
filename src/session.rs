//! APDU dispatcher and per-command state machines.
//!
//! Replaces the source's process-wide scratch (`cla, ins, p1, p2, p3,
//! sw1, sw2` as static globals) with a single [`Session`] value threaded
//! by exclusive reference through every handler. The only state that is
//! genuinely global is the NVM itself (external) and the volatile
//! `pin_ok` bit, which lives here as a session-local field instead.

use crate::apdu::{self, ins, Header, StatusWord, CLA_ADMIN, CLA_PURSE};
use crate::auth::{self, VerifyOutcome};
use crate::io::CardIo;
use crate::layout::{MAX_PERSO_LEN, PIN_LEN, PUK_LEN};
use crate::nvm::Nvm;
use crate::state::State;

/// One card session: the NVM, the I/O channel, and the single-use PIN
/// ticket, threaded through every handler.
#[allow(missing_debug_implementations)]
pub struct Session<'a, N: Nvm, IO: CardIo> {
    nvm: &'a mut N,
    io: &'a mut IO,
    pin_ok: bool,
}

impl<'a, N: Nvm, IO: CardIo> Session<'a, N, IO> {
    /// Start a session over the given NVM and I/O channel. `pin_ok`
    /// starts cleared.
    pub fn new(nvm: &'a mut N, io: &'a mut IO) -> Self {
        Session {
            nvm,
            io,
            pin_ok: false,
        }
    }

    fn state(&mut self) -> State<'_, N> {
        State::new(self.nvm)
    }

    /// Replay any pending journal transaction left over from a crash.
    /// Must run before the ATR is emitted.
    pub fn boot(&mut self) {
        self.state().replay_journal();
    }

    /// Emit the ATR. `historical_bytes` is produced by the surrounding
    /// firmware and simply streamed here.
    pub fn send_atr(&mut self, historical_bytes: &[u8]) {
        crate::io::write_atr(self.io, historical_bytes);
    }

    fn recv_header(&mut self) -> Header {
        let cla = self.io.recv_byte();
        let ins = self.io.recv_byte();
        let p1 = self.io.recv_byte();
        let p2 = self.io.recv_byte();
        let p3 = self.io.recv_byte();
        Header { cla, ins, p1, p2, p3 }
    }

    fn send_sw(&mut self, sw: StatusWord) {
        self.io.send_byte(sw.sw1);
        self.io.send_byte(sw.sw2);
    }

    /// Run forever: receive one APDU, dispatch it, trail the status word.
    pub fn run(&mut self) -> ! {
        loop {
            self.serve_one();
        }
    }

    /// Serve exactly one request/response cycle. Exposed separately from
    /// [`Session::run`] so tests can drive individual APDUs.
    pub fn serve_one(&mut self) {
        let header = self.recv_header();
        card_trace!("apdu: cla={:x} ins={:x} p3={}", header.cla, header.ins, header.p3);
        let sw = self.dispatch(header);
        card_trace!("apdu: sw={:x}{:x}", sw.sw1, sw.sw2);
        self.send_sw(sw);
    }

    fn dispatch(&mut self, h: Header) -> StatusWord {
        match h.cla {
            CLA_ADMIN => match h.ins {
                ins::VERSION => self.handle_version(h),
                ins::INTRO_PERSO => self.handle_intro_perso(h),
                ins::READ_PERSO => self.handle_read_perso(h),
                _ => StatusWord::UNKNOWN_INS,
            },
            CLA_PURSE => match h.ins {
                ins::READ_BALANCE => self.handle_read_balance(h),
                ins::CREDIT => self.handle_credit(h),
                ins::DEBIT => self.handle_debit(h),
                ins::VERIFY_PIN => self.handle_verify_pin(h),
                ins::CHANGE_PIN => self.handle_change_pin(h),
                ins::RESET_PIN_BY_PUK => self.handle_reset_pin_by_puk(h),
                ins::READ_CTR => self.handle_read_ctr(h),
                _ => StatusWord::UNKNOWN_INS,
            },
            _ => StatusWord::UNKNOWN_CLA,
        }
    }

    fn ack(&mut self, ins: u8) {
        self.io.send_byte(ins);
    }

    fn recv_into(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.io.recv_byte();
        }
    }

    fn send_slice(&mut self, buf: &[u8]) {
        for &b in buf {
            self.io.send_byte(b);
        }
    }

    /// Consume the PIN ticket unconditionally, reporting whether it was
    /// set. Every PIN-protected operation calls this exactly once before
    /// proceeding, regardless of the outcome: a ticket is single-use
    /// whether or not the operation it authorizes actually succeeds.
    fn consume_ticket(&mut self) -> bool {
        let was_ok = self.pin_ok;
        self.pin_ok = false;
        was_ok
    }

    // -- CLA_ADMIN --------------------------------------------------

    fn handle_version(&mut self, h: Header) -> StatusWord {
        if h.p3 != apdu::VERSION_STRING.len() as u8 {
            return StatusWord::wrong_length(apdu::VERSION_STRING.len() as u8);
        }
        self.ack(h.ins);
        self.send_slice(apdu::VERSION_STRING);
        StatusWord::OK
    }

    fn handle_intro_perso(&mut self, h: Header) -> StatusWord {
        if h.p3 as usize > MAX_PERSO_LEN {
            return StatusWord::wrong_length(MAX_PERSO_LEN as u8);
        }
        self.ack(h.ins);
        let mut perso = [0u8; MAX_PERSO_LEN];
        let len = h.p3 as usize;
        self.recv_into(&mut perso[..len]);

        let puk = auth::derive_puk(&perso[..len]);
        self.state().stage_personalization(h.p3, &perso[..len], puk);
        self.pin_ok = false;
        StatusWord::OK
    }

    fn handle_read_perso(&mut self, h: Header) -> StatusWord {
        let stored_len = self.state().perso_len();
        if h.p3 != stored_len {
            return StatusWord::wrong_length(stored_len);
        }
        self.ack(h.ins);
        let mut perso = [0u8; MAX_PERSO_LEN];
        self.state().perso_blob(&mut perso[..stored_len as usize]);
        self.send_slice(&perso[..stored_len as usize]);
        StatusWord::OK
    }

    // -- CLA_PURSE: PIN-ticket-protected ops --------------------------

    fn handle_read_balance(&mut self, h: Header) -> StatusWord {
        if h.p3 != 2 {
            return StatusWord::wrong_length(2);
        }
        if !self.consume_ticket() {
            return StatusWord::SECURITY_NOT_SATISFIED;
        }
        self.ack(h.ins);
        let balance = self.state().balance();
        self.send_slice(&balance.to_le_bytes());
        StatusWord::OK
    }

    fn handle_credit(&mut self, h: Header) -> StatusWord {
        if h.p3 != 2 {
            return StatusWord::wrong_length(2);
        }
        if !self.consume_ticket() {
            return StatusWord::SECURITY_NOT_SATISFIED;
        }
        self.ack(h.ins);
        let mut amount_bytes = [0u8; 2];
        self.recv_into(&mut amount_bytes);
        let amount = u16::from_le_bytes(amount_bytes);

        let expected_ctr = h.p1p2_as_u16();
        let ctr = self.state().ctr();
        if expected_ctr != ctr {
            return StatusWord::ANTI_REPLAY;
        }
        // The counter advances on a match before the balance mutation it
        // authorized is even computed: a replay of this exact APDU is
        // then rejected by the counter check above, whether or not the
        // amount below turns out to overflow.
        self.state().stage_ctr_advance(ctr.wrapping_add(1));

        let balance = self.state().balance();
        let new_balance = balance.wrapping_add(amount);
        if new_balance < balance {
            return StatusWord::MONETARY_ERROR;
        }
        self.state().stage_balance(new_balance);
        StatusWord::OK
    }

    fn handle_debit(&mut self, h: Header) -> StatusWord {
        if h.p3 != 2 {
            return StatusWord::wrong_length(2);
        }
        if !self.consume_ticket() {
            return StatusWord::SECURITY_NOT_SATISFIED;
        }
        self.ack(h.ins);
        let mut amount_bytes = [0u8; 2];
        self.recv_into(&mut amount_bytes);
        let amount = u16::from_le_bytes(amount_bytes);

        let expected_ctr = h.p1p2_as_u16();
        let ctr = self.state().ctr();
        if expected_ctr != ctr {
            return StatusWord::ANTI_REPLAY;
        }
        self.state().stage_ctr_advance(ctr.wrapping_add(1));

        let balance = self.state().balance();
        if amount > balance {
            return StatusWord::MONETARY_ERROR;
        }
        let new_balance = balance - amount;
        self.state().stage_balance(new_balance);
        StatusWord::OK
    }

    fn handle_read_ctr(&mut self, h: Header) -> StatusWord {
        if h.p3 != 2 {
            return StatusWord::wrong_length(2);
        }
        self.ack(h.ins);
        let ctr = self.state().ctr();
        self.send_slice(&ctr.to_le_bytes());
        StatusWord::OK
    }

    // -- CLA_PURSE: PIN/PUK management --------------------------------

    fn handle_verify_pin(&mut self, h: Header) -> StatusWord {
        if h.p3 != PIN_LEN as u8 {
            return StatusWord::wrong_length(PIN_LEN as u8);
        }
        let tries = self.state().pin_tries();
        if tries == 0 {
            return StatusWord::BLOCKED;
        }
        self.ack(h.ins);
        let mut supplied = [0u8; PIN_LEN];
        self.recv_into(&mut supplied);

        let stored = self.state().pin();
        let outcome = auth::verify(&stored, &supplied);
        let next = auth::next_tries(tries, crate::layout::PIN_TRY_MAX, outcome);
        self.state().set_pin_tries(next);

        match outcome {
            VerifyOutcome::Match => {
                self.pin_ok = true;
                StatusWord::OK
            }
            VerifyOutcome::Mismatch => {
                self.pin_ok = false;
                if next == 0 {
                    StatusWord::BLOCKED
                } else {
                    StatusWord::auth_failed(next)
                }
            }
        }
    }

    fn handle_change_pin(&mut self, h: Header) -> StatusWord {
        if h.p3 != (2 * PIN_LEN) as u8 {
            return StatusWord::wrong_length((2 * PIN_LEN) as u8);
        }
        let tries = self.state().pin_tries();
        if tries == 0 {
            return StatusWord::BLOCKED;
        }
        self.ack(h.ins);
        let mut old_pin = [0u8; PIN_LEN];
        let mut new_pin = [0u8; PIN_LEN];
        self.recv_into(&mut old_pin);
        self.recv_into(&mut new_pin);

        let stored = self.state().pin();
        let outcome = auth::verify(&stored, &old_pin);
        self.pin_ok = false;

        match outcome {
            VerifyOutcome::Match => {
                self.state().stage_pin_reset(new_pin);
                StatusWord::OK
            }
            VerifyOutcome::Mismatch => {
                let next = auth::next_tries(tries, crate::layout::PIN_TRY_MAX, outcome);
                self.state().set_pin_tries(next);
                if next == 0 {
                    StatusWord::BLOCKED
                } else {
                    StatusWord::auth_failed(next)
                }
            }
        }
    }

    fn handle_reset_pin_by_puk(&mut self, h: Header) -> StatusWord {
        const LC: u8 = (PUK_LEN + PIN_LEN) as u8;
        if h.p3 != LC {
            return StatusWord::wrong_length(LC);
        }
        let tries = self.state().puk_tries();
        if tries == 0 {
            return StatusWord::BLOCKED;
        }
        self.ack(h.ins);
        // Read all 10 bytes regardless of whether the PUK matches, so
        // the terminal's transmission length matches the declared Lc.
        let mut supplied_puk = [0u8; PUK_LEN];
        let mut new_pin = [0u8; PIN_LEN];
        self.recv_into(&mut supplied_puk);
        self.recv_into(&mut new_pin);

        let stored_puk = self.state().puk();
        let outcome = auth::verify(&stored_puk, &supplied_puk);
        self.pin_ok = false;

        match outcome {
            VerifyOutcome::Match => {
                self.state().stage_pin_reset_via_puk(new_pin);
                StatusWord::OK
            }
            VerifyOutcome::Mismatch => {
                let next = auth::next_tries(tries, crate::layout::PUK_TRY_MAX, outcome);
                self.state().set_puk_tries(next);
                if next == 0 {
                    StatusWord::BLOCKED
                } else {
                    StatusWord::auth_failed(next)
                }
            }
        }
    }
}
