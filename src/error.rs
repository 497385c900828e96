//! Error types for the journal builder.
//!
//! These are the only two internally-fallible operations in the core;
//! everything else is reported on the wire as a status word rather than
//! unwound as a Rust error.

use core::fmt;

/// Failure staging a [`crate::journal::JournalTransaction`].
///
/// Either failure leaves the journal `EMPTY`: `stage` writes the `EMPTY`
/// sentinel before anything else, so an error detected while building
/// the transaction never reaches the NVM.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JournalError {
    /// More entries were staged than `MAX_OPS` allows.
    TooManyOps,
    /// The staged payloads together exceed `MAX_DATA` bytes.
    BufferOverflow,
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalError::TooManyOps => write!(f, "too many journal operations"),
            JournalError::BufferOverflow => write!(f, "journal buffer overflow"),
        }
    }
}
