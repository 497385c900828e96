//! Firmware core for a contact smart card stored-value purse
//!
//! Implements the ISO 7816-3 T=0 request/response loop over a single
//! serial line: an anti-tearing NVM journal that makes groups of
//! persistent-state updates atomic across unexpected resets, and the
//! APDU command dispatcher (authentication, PIN/PUK retry counters, and
//! the credit/debit purse operations) built on top of it.
//!
//! This crate depends on a host-supplied [`nvm::Nvm`] (the byte-
//! addressable EEPROM/Flash the card actually carries) and a
//! host-supplied [`io::CardIo`] (the byte-level UART/T=0 peripheral
//! driver). Neither driver is provided here.
//!
//! # Usage
//!
//! ```rust
//! use purse_card::nvm::Nvm;
//! use purse_card::io::CardIo;
//! use purse_card::session::Session;
//!
//! # struct ArrayNvm([u8; 256]);
//! # impl Nvm for ArrayNvm {
//! #     fn read_byte(&self, addr: u16) -> u8 { self.0[addr as usize] }
//! #     fn write_byte(&mut self, addr: u16, val: u8) { self.0[addr as usize] = val }
//! # }
//! # struct NullIo;
//! # impl CardIo for NullIo {
//! #     fn send_byte(&mut self, _b: u8) {}
//! #     fn recv_byte(&mut self) -> u8 { 0 }
//! # }
//! let mut nvm = ArrayNvm([0; 256]);
//! let mut io = NullIo;
//! let mut session = Session::new(&mut nvm, &mut io);
//! session.boot();
//! session.send_atr(&[0x00]);
//! session.serve_one();
//! ```
//!
//! ## License
//!
//! Licensed under either of
//!
//!  * Apache License, Version 2.0
//!    ([LICENSE-APACHE](LICENSE-APACHE) or http://www.apache.org/licenses/LICENSE-2.0)
//!  * MIT license
//!    ([LICENSE-MIT](LICENSE-MIT) or http://opensource.org/licenses/MIT)
//!
//! at your option.
#![cfg_attr(not(feature = "std"), no_std)]
// rustc lints.
#![warn(
    bare_trait_objects,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_qualifications
)]
#![allow(clippy::needless_doctest_main)]

#[macro_use]
mod macros;

pub mod apdu;
pub mod auth;
pub mod error;
pub mod io;
pub mod journal;
pub mod layout;
pub mod nvm;
pub mod session;
pub mod state;
