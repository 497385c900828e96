//! Absolute NVM addresses for every persistent entity.
//!
//! The core does not prescribe *where* in a real part these addresses
//! land (that's a board/part integration concern), but it does fix a
//! single, stable layout so that the journal's `dests` stay valid across
//! reboots. A real integration picks its own base address and re-exports
//! these as offsets from it; the constants below assume the NVM trait's
//! address space starts at 0.
#![allow(missing_docs)]

/// Maximum number of operations a single journal transaction may stage.
///
/// `INTRO_PERSO` stages exactly 8 entries, the widest transaction the
/// core issues, so 8 is the tight bound.
pub const MAX_OPS: usize = 8;

/// Maximum total bytes of payload a single journal transaction may stage.
///
/// `INTRO_PERSO`'s 8 entries (1 + 32 + 6 + 4 + 1 + 1 + 2 + 2 bytes) sum to
/// 49 bytes; 64 leaves headroom.
pub const MAX_DATA: usize = 64;

/// Sentinel value for `state == PENDING`.
///
/// Chosen so that any torn write to this byte overwhelmingly likely lands
/// on a non-sentinel value, which the `EMPTY`-by-default rule then
/// safely treats as `EMPTY`.
pub const JOURNAL_PENDING: u8 = 0x1C;

pub const MAX_PERSO_LEN: usize = 32;
pub const PUK_LEN: usize = 6;
pub const PIN_LEN: usize = 4;

pub const PIN_TRY_MAX: u8 = 3;
pub const PUK_TRY_MAX: u8 = 5;

pub const DEFAULT_PIN: [u8; PIN_LEN] = [1, 2, 3, 4];

// --- Persistent entity addresses -------------------------------------

pub const ADDR_PERSO_LEN: u16 = 0x00;
pub const ADDR_PERSO_BLOB: u16 = ADDR_PERSO_LEN + 1;
pub const ADDR_PUK: u16 = ADDR_PERSO_BLOB + MAX_PERSO_LEN as u16;
pub const ADDR_PIN: u16 = ADDR_PUK + PUK_LEN as u16;
pub const ADDR_PIN_TRIES: u16 = ADDR_PIN + PIN_LEN as u16;
pub const ADDR_PUK_TRIES: u16 = ADDR_PIN_TRIES + 1;
pub const ADDR_CTR: u16 = ADDR_PUK_TRIES + 1;
pub const ADDR_BALANCE: u16 = ADDR_CTR + 2;

const STATE_END: u16 = ADDR_BALANCE + 2;

// --- Journal record address ------------------------------------------

pub const ADDR_JOURNAL_STATE: u16 = STATE_END;
pub const ADDR_JOURNAL_OP_COUNT: u16 = ADDR_JOURNAL_STATE + 1;
pub const ADDR_JOURNAL_SIZES: u16 = ADDR_JOURNAL_OP_COUNT + 1;
pub const ADDR_JOURNAL_DESTS: u16 = ADDR_JOURNAL_SIZES + MAX_OPS as u16;
pub const ADDR_JOURNAL_BUFFER: u16 = ADDR_JOURNAL_DESTS + (2 * MAX_OPS) as u16;

/// First address past the end of the fixed layout; useful for simulators
/// sizing a backing array.
pub const LAYOUT_END: u16 = ADDR_JOURNAL_BUFFER + MAX_DATA as u16;
