//! Host-side test doubles for `Nvm` and `CardIo`.
//!
//! `ArrayNvm` stands in for the EEPROM/Flash the real card carries;
//! `TearableNvm` wraps it with a byte-write budget so tests can simulate a
//! power loss at an exact point in a journal `stage`; `SharedIo` stands in
//! for the UART/T=0 peripheral, with interior mutability so a test can
//! feed bytes and drain output around a long-lived `Session` without
//! fighting the borrow checker.

use purse_card::io::CardIo;
use purse_card::layout;
use purse_card::nvm::Nvm;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Backing size for [`ArrayNvm`]; a little headroom past `LAYOUT_END` for
/// property tests that want scratch addresses of their own.
pub const NVM_SIZE: usize = layout::LAYOUT_END as usize + 16;

/// A plain, always-durable NVM simulator.
#[derive(Clone)]
pub struct ArrayNvm {
    mem: [u8; NVM_SIZE],
}

impl ArrayNvm {
    pub fn new() -> Self {
        ArrayNvm {
            mem: [0u8; NVM_SIZE],
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mem
    }
}

impl Default for ArrayNvm {
    fn default() -> Self {
        Self::new()
    }
}

impl Nvm for ArrayNvm {
    fn read_byte(&self, addr: u16) -> u8 {
        self.mem[addr as usize]
    }

    fn write_byte(&mut self, addr: u16, val: u8) {
        self.mem[addr as usize] = val;
    }
}

/// Wraps an [`ArrayNvm`] with an optional write budget: once the budget
/// reaches zero, further byte writes are silently dropped, simulating a
/// power loss mid-operation at exact byte granularity. `Nvm::write_word`
/// and `Nvm::write_block` decompose into `write_byte` calls, so this is
/// fine-grained enough to land the crash anywhere inside a journal
/// `stage`.
pub struct TearableNvm {
    inner: ArrayNvm,
    budget: Option<usize>,
}

impl TearableNvm {
    pub fn new() -> Self {
        TearableNvm {
            inner: ArrayNvm::new(),
            budget: None,
        }
    }

    /// Resume from a previous simulator's bytes, with a fresh crash
    /// budget (models a reboot onto the same NVM part).
    pub fn resume_from(inner: ArrayNvm, budget: Option<usize>) -> Self {
        TearableNvm { inner, budget }
    }

    pub fn crash_after(writes: usize) -> Self {
        TearableNvm {
            inner: ArrayNvm::new(),
            budget: Some(writes),
        }
    }

    pub fn writes_remaining(&self) -> Option<usize> {
        self.budget
    }

    pub fn snapshot(&self) -> ArrayNvm {
        self.inner.clone()
    }
}

impl Default for TearableNvm {
    fn default() -> Self {
        Self::new()
    }
}

impl Nvm for TearableNvm {
    fn read_byte(&self, addr: u16) -> u8 {
        self.inner.read_byte(addr)
    }

    fn write_byte(&mut self, addr: u16, val: u8) {
        if let Some(remaining) = self.budget {
            if remaining == 0 {
                return;
            }
            self.budget = Some(remaining - 1);
        }
        self.inner.write_byte(addr, val);
    }
}

struct VecIoInner {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl VecIoInner {
    fn new() -> Self {
        VecIoInner {
            input: VecDeque::new(),
            output: Vec::new(),
        }
    }
}

/// A cheaply-cloneable handle onto an in-memory byte channel.
///
/// Every clone shares the same underlying queue, so a test can hand one
/// clone to a [`purse_card::session::Session`] (which needs `&mut`
/// access for the whole session) while keeping another clone to feed
/// input and drain output between individual `serve_one` calls.
#[derive(Clone)]
pub struct SharedIo(Rc<RefCell<VecIoInner>>);

impl SharedIo {
    pub fn new() -> Self {
        SharedIo(Rc::new(RefCell::new(VecIoInner::new())))
    }

    /// Queue bytes for the next `recv_byte` calls.
    pub fn feed(&self, bytes: &[u8]) {
        self.0.borrow_mut().input.extend(bytes.iter().copied());
    }

    /// Feed a full APDU: the 5-byte header followed by its data field.
    pub fn feed_apdu(&self, header: [u8; 5], data: &[u8]) {
        self.feed(&header);
        self.feed(data);
    }

    /// Drain and return everything written since the last call.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.borrow_mut().output)
    }
}

impl Default for SharedIo {
    fn default() -> Self {
        Self::new()
    }
}

impl CardIo for SharedIo {
    fn send_byte(&mut self, b: u8) {
        self.0.borrow_mut().output.push(b);
    }

    fn recv_byte(&mut self) -> u8 {
        self.0
            .borrow_mut()
            .input
            .pop_front()
            .expect("test fed enough bytes for this APDU")
    }
}

/// Split a dispatcher reply into its leading bytes (ack + any response
/// data) and its trailing status word.
pub fn split_sw(reply: &[u8]) -> (&[u8], [u8; 2]) {
    let (head, tail) = reply.split_at(reply.len() - 2);
    (head, [tail[0], tail[1]])
}
