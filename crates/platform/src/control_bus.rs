//! Register-addressed I2C driver for the DLPC1438 control port.
//!
//! Writes go out as one transaction: `[opcode] ++ payload`. Reads are a
//! repeated-start `write_read`: the single opcode byte, then `len` bytes.
//!
//! Some controller revisions clock out one extra byte ahead of the payload.
//! With [`ReadQuirk::LeadingByte`] the driver reads `len + 1` bytes, strips
//! the first one and hands it back in [`ReadOutcome`] so the caller can log it.
//!
//! The driver never retries. A missing acknowledgment surfaces as
//! [`ControlError::BusNack`] and the caller decides what it means.

// Scratch buffers are sized MAX_PAYLOAD + 1; lengths are checked against
// MAX_PAYLOAD before any slice is taken.
#![allow(clippy::arithmetic_side_effects)]

use core::fmt::Write as _;

use embedded_hal::i2c::I2c;
use heapless::{String, Vec};

use crate::dlpc1438::Register;
use crate::error::ControlError;

/// Largest register payload the driver moves in one transaction.
pub const MAX_PAYLOAD: usize = 8;

/// Number of 7-bit addresses on the bus.
pub const ADDRESS_SPACE: usize = 128;

/// Capacity of the rendered scan grid.
pub const SCAN_GRID_CAPACITY: usize = 512;

/// Read-path behaviour of the controller revision on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadQuirk {
    /// The payload starts at the first byte clocked out.
    #[default]
    None,
    /// One byte of unknown meaning precedes the payload.
    LeadingByte,
}

/// What a read returned besides the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadOutcome {
    /// The stripped leading byte under [`ReadQuirk::LeadingByte`].
    pub leading: Option<u8>,
}

/// Control-bus driver bound to one target address.
pub struct ControlBus<I> {
    i2c: I,
    address: u8,
    quirk: ReadQuirk,
}

impl<I: I2c> ControlBus<I> {
    /// Bind `i2c` to the 7-bit `address`.
    pub fn new(i2c: I, address: u8, quirk: ReadQuirk) -> Self {
        Self { i2c, address, quirk }
    }

    /// Target address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Read quirk in effect.
    pub fn quirk(&self) -> ReadQuirk {
        self.quirk
    }

    /// Give the bus back.
    pub fn release(self) -> I {
        self.i2c
    }

    /// Write `data` to `opcode` as a single transaction.
    pub fn write(&mut self, opcode: u8, data: &[u8]) -> Result<(), ControlError> {
        if data.len() > MAX_PAYLOAD {
            return Err(ControlError::WriteTooLong { len: data.len() });
        }
        let mut frame = [0u8; MAX_PAYLOAD + 1];
        let total = data.len() + 1;
        let out = frame.get_mut(..total).ok_or(ControlError::WriteTooLong { len: data.len() })?;
        if let Some((head, tail)) = out.split_first_mut() {
            *head = opcode;
            tail.copy_from_slice(data);
        }

        trace!("i2c write {:#x} len {}", opcode, data.len());
        self.i2c.write(self.address, out).map_err(|e| {
            let err = ControlError::from_bus(opcode, &e);
            warn!("i2c write {:#x} failed: {}", opcode, err.as_str());
            err
        })
    }

    /// Read `buf.len()` payload bytes from `opcode`.
    pub fn read(&mut self, opcode: u8, buf: &mut [u8]) -> Result<ReadOutcome, ControlError> {
        if buf.len() > MAX_PAYLOAD {
            return Err(ControlError::ReadTooLong { len: buf.len() });
        }

        let result = match self.quirk {
            ReadQuirk::None => self
                .i2c
                .write_read(self.address, &[opcode], buf)
                .map(|()| ReadOutcome::default()),
            ReadQuirk::LeadingByte => {
                let mut scratch = [0u8; MAX_PAYLOAD + 1];
                let total = buf.len() + 1;
                let raw = scratch.get_mut(..total).ok_or(ControlError::ReadTooLong { len: buf.len() })?;
                self.i2c.write_read(self.address, &[opcode], raw).map(|()| {
                    let (leading, payload) = match raw.split_first() {
                        Some((l, p)) => (Some(*l), p),
                        None => (None, &[][..]),
                    };
                    buf.copy_from_slice(payload);
                    ReadOutcome { leading }
                })
            }
        };

        match result {
            Ok(outcome) => {
                trace!("i2c read {:#x} len {}", opcode, buf.len());
                if let Some(l) = outcome.leading {
                    debug!("i2c read {:#x}: stripped leading byte {:#x}", opcode, l);
                }
                Ok(outcome)
            }
            Err(e) => {
                let err = ControlError::from_bus(opcode, &e);
                warn!("i2c read {:#x} failed: {}", opcode, err.as_str());
                Err(err)
            }
        }
    }

    /// Write a full register payload through its write opcode.
    pub fn write_register(&mut self, reg: &Register, data: &[u8]) -> Result<(), ControlError> {
        let opcode = reg.write.ok_or(ControlError::ReadOnlyRegister { register: reg.read })?;
        debug!("write {}: {} bytes", reg.name, data.len());
        self.write(opcode, data)
    }

    /// Read a full register payload through its read opcode.
    pub fn read_register(&mut self, reg: &Register) -> Result<Vec<u8, MAX_PAYLOAD>, ControlError> {
        let mut buf = [0u8; MAX_PAYLOAD];
        let payload = buf.get_mut(..reg.len).ok_or(ControlError::ReadTooLong { len: reg.len })?;
        self.read(reg.read, payload)?;
        Vec::from_slice(payload).map_err(|_| ControlError::ReadTooLong { len: reg.len })
    }

    /// Read a one-byte register.
    pub fn read_byte(&mut self, reg: &Register) -> Result<u8, ControlError> {
        let mut b = [0u8; 1];
        self.read(reg.read, &mut b)?;
        let [value] = b;
        Ok(value)
    }

    /// True when the controller acknowledges its address.
    ///
    /// NACK is an answer here, not an error. Other bus faults still propagate.
    pub fn is_present(&mut self) -> Result<bool, ControlError> {
        let mut b = [0u8; 1];
        match self.i2c.read(self.address, &mut b) {
            Ok(()) => Ok(true),
            Err(e) => match ControlError::from_bus(0x00, &e) {
                ControlError::BusNack { .. } => Ok(false),
                err => Err(err),
            },
        }
    }

    /// Try a one-byte read at every non-reserved 7-bit address.
    pub fn scan(&mut self) -> BusScan {
        let mut scan = BusScan::empty();
        for addr in 0u8..=0x7F {
            if is_reserved(addr) {
                continue;
            }
            let mut b = [0u8; 1];
            let acked = self.i2c.read(addr, &mut b).is_ok();
            if let Some(slot) = scan.acked.get_mut(usize::from(addr)) {
                *slot = acked;
            }
        }
        info!("bus scan: {} device(s) found", scan.count());
        scan
    }
}

/// Reserved I2C addresses: `0000xxx` and `1111xxx`.
pub const fn is_reserved(addr: u8) -> bool {
    let top = addr & 0x78;
    top == 0x00 || top == 0x78
}

/// Result of [`ControlBus::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusScan {
    acked: [bool; ADDRESS_SPACE],
}

impl BusScan {
    fn empty() -> Self {
        Self { acked: [false; ADDRESS_SPACE] }
    }

    /// Build a scan result from a list of responding addresses.
    pub fn from_responders(addrs: &[u8]) -> Self {
        let mut scan = Self::empty();
        for &a in addrs {
            if is_reserved(a) {
                continue;
            }
            if let Some(slot) = scan.acked.get_mut(usize::from(a)) {
                *slot = true;
            }
        }
        scan
    }

    /// Whether `addr` acknowledged. Reserved addresses are skipped and read as false.
    pub fn responded(&self, addr: u8) -> bool {
        self.acked.get(usize::from(addr)).copied().unwrap_or(false)
    }

    /// Number of responding addresses.
    pub fn count(&self) -> usize {
        self.acked.iter().filter(|a| **a).count()
    }

    /// Responding addresses in ascending order.
    pub fn responders(&self) -> impl Iterator<Item = u8> + '_ {
        (0u8..).zip(self.acked.iter()).filter(|(_, a)| **a).map(|(addr, _)| addr)
    }

    /// Render the 8×16 grid: `@` responded, `.` silent or reserved.
    ///
    /// ```text
    ///    0 1 2 3 4 5 6 7 8 9 A B C D E F
    /// 00 . . . . . . . . . . . . . . . .
    /// 10 . . . . . . . . . . . @ . . . .
    /// ```
    pub fn render(&self) -> String<SCAN_GRID_CAPACITY> {
        let mut out = String::new();
        // Capacity covers 9 lines of 34 chars; writes cannot fail.
        let _ = out.push_str("   0 1 2 3 4 5 6 7 8 9 A B C D E F\n");
        for (row, cells) in self.acked.chunks(16).enumerate() {
            let _ = write!(out, "{:02X}", row * 16);
            for &acked in cells {
                let _ = out.push(' ');
                let _ = out.push(if acked { '@' } else { '.' });
            }
            let _ = out.push('\n');
        }
        out
    }
}
