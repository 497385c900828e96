//! Anti-tearing journal.
//!
//! Makes a set of NVM byte-range writes atomic across unexpected resets.
//! Replaces the original `engage(n1, p1, d1, n2, p2, d2, ..., 0)` variadic
//! call with an explicit builder: entries accumulate in
//! [`JournalTransaction`] and the whole transaction is staged in one
//! `stage` call, which performs the size/capacity checks statically
//! against `MAX_OPS`/`MAX_DATA` instead of at a sentinel-terminated
//! runtime scan.

use crate::error::JournalError;
use crate::layout::{self, MAX_DATA, MAX_OPS};
use crate::nvm::Nvm;

/// Value written to `state` to mark the journal empty.
///
/// Any byte other than [`layout::JOURNAL_PENDING`] is treated as `EMPTY`;
/// 0x00 is simply the canonical empty value we write.
const JOURNAL_EMPTY: u8 = 0x00;

struct Entry<'a> {
    dst: u16,
    bytes: &'a [u8],
}

/// A journal transaction being assembled.
///
/// Entries are staged durably by [`JournalTransaction::stage`] and later
/// replayed (or discarded) by [`commit`].
pub struct JournalTransaction<'a> {
    entries: [Option<Entry<'a>>; MAX_OPS],
    count: usize,
    total_len: usize,
}

impl<'a> JournalTransaction<'a> {
    /// Start an empty transaction.
    pub fn new() -> Self {
        JournalTransaction {
            entries: [None, None, None, None, None, None, None, None],
            count: 0,
            total_len: 0,
        }
    }

    /// Stage one write of `bytes` to `dst`, to be applied atomically with
    /// every other entry added to this transaction.
    pub fn add(&mut self, dst: u16, bytes: &'a [u8]) -> Result<(), JournalError> {
        if self.count >= MAX_OPS {
            return Err(JournalError::TooManyOps);
        }
        if self.total_len + bytes.len() > MAX_DATA {
            return Err(JournalError::BufferOverflow);
        }
        self.entries[self.count] = Some(Entry { dst, bytes });
        self.count += 1;
        self.total_len += bytes.len();
        Ok(())
    }

    /// Durably stage the accumulated entries.
    ///
    /// Staging order (must be preserved exactly):
    /// 1. write the `EMPTY` sentinel to `state`;
    /// 2. write `buffer` payloads, `dests`, `sizes`, and `op_count`, in
    ///    any order;
    /// 3. write the `PENDING` sentinel to `state`.
    ///
    /// A crash before step 3 leaves the journal cleanly `EMPTY`; a crash
    /// during step 3 leaves `state` at an intermediate byte value, which
    /// step 1 plus the `EMPTY`-by-default rule makes safe.
    pub fn stage<N: Nvm>(self, nvm: &mut N) -> Result<(), JournalError> {
        card_trace!("journal: staging {} entries", self.count);

        nvm.write_byte(layout::ADDR_JOURNAL_STATE, JOURNAL_EMPTY);

        let mut offset: u16 = 0;
        for i in 0..self.count {
            let entry = self.entries[i].as_ref().expect("count entries are Some");
            nvm.write_block(entry.bytes, layout::ADDR_JOURNAL_BUFFER + offset);
            nvm.write_word(layout::ADDR_JOURNAL_DESTS + (2 * i) as u16, entry.dst);
            nvm.write_byte(
                layout::ADDR_JOURNAL_SIZES + i as u16,
                entry.bytes.len() as u8,
            );
            offset += entry.bytes.len() as u16;
        }
        nvm.write_byte(layout::ADDR_JOURNAL_OP_COUNT, self.count as u8);

        nvm.write_byte(layout::ADDR_JOURNAL_STATE, layout::JOURNAL_PENDING);
        card_trace!("journal: staged, pending commit");
        Ok(())
    }
}

impl<'a> Default for JournalTransaction<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// Stage a transaction and immediately apply it.
///
/// Every journaled state update in [`crate::state::State`] goes through
/// this, not `stage` alone: a handler's update must be visible to the
/// very next command in the same power cycle, not only after a reboot.
/// `commit` is also called once at boot to replay whatever a crash left
/// pending (the only window where that matters is between this `stage`
/// and this `commit`).
pub fn stage_and_commit<N: Nvm>(
    nvm: &mut N,
    txn: JournalTransaction<'_>,
) -> Result<(), JournalError> {
    txn.stage(nvm)?;
    commit(nvm);
    Ok(())
}

/// Replay a pending journal, or do nothing if it is empty.
///
/// Called once at boot before the ATR is emitted, and is idempotent:
/// `commit(); commit();` is equivalent to `commit();`, since the second
/// call observes `EMPTY` and only re-asserts it.
pub fn commit<N: Nvm>(nvm: &mut N) {
    let state = nvm.read_byte(layout::ADDR_JOURNAL_STATE);
    if state != layout::JOURNAL_PENDING {
        nvm.write_byte(layout::ADDR_JOURNAL_STATE, JOURNAL_EMPTY);
        return;
    }

    card_debug!("journal: replaying pending transaction");
    let op_count = nvm.read_byte(layout::ADDR_JOURNAL_OP_COUNT) as usize;
    let op_count = core::cmp::min(op_count, MAX_OPS);

    let mut offset: u16 = 0;
    for i in 0..op_count {
        let size = nvm.read_byte(layout::ADDR_JOURNAL_SIZES + i as u16) as u16;
        let dst = nvm.read_word(layout::ADDR_JOURNAL_DESTS + (2 * i) as u16);
        for j in 0..size {
            let b = nvm.read_byte(layout::ADDR_JOURNAL_BUFFER + offset + j);
            nvm.write_byte(dst + j, b);
        }
        offset += size;
    }

    nvm.write_byte(layout::ADDR_JOURNAL_STATE, JOURNAL_EMPTY);
    card_debug!("journal: replay complete");
}
