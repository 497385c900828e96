//! Byte-level I/O channel.
//!
//! `send_byte`/`recv_byte` are the external collaborators the core
//! requires from its environment (the UART/T=0 peripheral driver is out
//! of scope), but the dispatcher still needs them typed.

/// Blocking byte-at-a-time T=0 channel to the terminal.
pub trait CardIo {
    /// Push one byte; blocks until accepted.
    fn send_byte(&mut self, b: u8);
    /// Receive one byte; blocks until available.
    fn recv_byte(&mut self) -> u8;
}

/// Emit the fixed ISO 7816-3 leading byte plus the caller-supplied
/// historical-bytes field.
///
/// The exact historical bytes (and anything after them) are produced by
/// the surrounding firmware and are out of scope here; this helper only
/// fixes the one byte the protocol mandates (`0x3B`) and streams
/// whatever follows.
pub fn write_atr<IO: CardIo>(io: &mut IO, historical_bytes: &[u8]) {
    io.send_byte(0x3B);
    for &b in historical_bytes {
        io.send_byte(b);
    }
}
