//! Simulated peripherals for host builds.
//!
//! Used by unit tests, the integration tests under `tests/`, and the
//! firmware emulator. Each simulation records what it was asked to do so
//! tests can assert on order as well as content.

#![cfg(any(test, feature = "std"))]
#![allow(
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation
)]

use core::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::i2c::{self, ErrorKind, I2c, NoAcknowledgeSource, Operation};

use crate::dlpc1438::{
    register_by_read_opcode, Mode, PrintControl, DLPC1438_I2C_ADDR, REG_OPERATING_MODE,
    REG_PRINT_LAYER_CONTROL,
};
use crate::dma::PixelDmaChain;
use crate::video_timing::{Generator, TimingGenerators, ALL_GENERATORS};

// ── Simulated DLPC1438 ──────────────────────────────────────────────────────

#[derive(Default)]
struct DlpcState {
    regs: BTreeMap<u8, Vec<u8>>,
    writes: Vec<(u8, Vec<u8>)>,
    reads: Vec<u8>,
    absent: bool,
    leading_byte: Option<u8>,
    drop_writes: u32,
    light_on: bool,
    frames_left: Option<u32>,
}

/// DLPC1438 register store speaking the controller's I2C protocol.
///
/// - Writes of `[opcode, payload..]` store the payload under `opcode`.
/// - A one-byte write sets the read pointer; a following read returns the
///   register whose read opcode it is (write + 1 for known registers,
///   the same opcode for anything unknown).
/// - The light engine turns on with a light-on layer command and off with
///   light-off, a non-print mode write, or once its frames elapse.
///
/// Clones share state, so a test can keep a handle while the driver owns one.
#[derive(Clone, Default)]
pub struct SimulatedDlpc {
    inner: Rc<RefCell<DlpcState>>,
}

impl SimulatedDlpc {
    /// Present, no quirk, reporting the splash screen as after boot.
    pub fn new() -> Self {
        let sim = Self::default();
        sim.set_register(REG_OPERATING_MODE.id(), &[Mode::Splashscreen.wire()]);
        sim
    }

    /// Prefix every read with `byte`.
    pub fn with_leading_byte(self, byte: u8) -> Self {
        self.inner.borrow_mut().leading_byte = Some(byte);
        self
    }

    /// Stop or resume acknowledging.
    pub fn set_present(&self, present: bool) {
        self.inner.borrow_mut().absent = !present;
    }

    /// Acknowledge the next `n` register writes without applying them.
    pub fn drop_next_writes(&self, n: u32) {
        self.inner.borrow_mut().drop_writes = n;
    }

    /// Overwrite a register behind the driver's back.
    pub fn set_register(&self, opcode: u8, value: &[u8]) {
        self.inner.borrow_mut().regs.insert(opcode, value.to_vec());
    }

    /// Stored value under a write opcode.
    pub fn register(&self, opcode: u8) -> Option<Vec<u8>> {
        self.inner.borrow().regs.get(&opcode).cloned()
    }

    /// Mode the controller is in.
    pub fn mode(&self) -> Option<Mode> {
        self.register(REG_OPERATING_MODE.id())
            .and_then(|v| v.first().copied())
            .and_then(Mode::from_wire)
    }

    /// True while the light engine is lit.
    pub fn light_on(&self) -> bool {
        self.inner.borrow().light_on
    }

    /// Let `n` frames go by. Finite exposures end; indefinite ones do not.
    pub fn elapse_frames(&self, n: u32) {
        let mut s = self.inner.borrow_mut();
        if let Some(left) = s.frames_left {
            let left = left.saturating_sub(n);
            s.frames_left = Some(left);
            if left == 0 {
                s.light_on = false;
                s.frames_left = None;
            }
        }
    }

    /// Every register write in bus order: `(opcode, payload)`.
    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.inner.borrow().writes.clone()
    }

    /// Write opcodes in bus order.
    pub fn write_opcodes(&self) -> Vec<u8> {
        self.inner.borrow().writes.iter().map(|(op, _)| *op).collect()
    }

    /// Payloads written to `opcode`, oldest first.
    pub fn writes_to(&self, opcode: u8) -> Vec<Vec<u8>> {
        self.inner
            .borrow()
            .writes
            .iter()
            .filter(|(op, _)| *op == opcode)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// True when `opcode` was written at least once.
    pub fn wrote(&self, opcode: u8) -> bool {
        self.inner.borrow().writes.iter().any(|(op, _)| *op == opcode)
    }

    /// Read opcodes in bus order.
    pub fn reads(&self) -> Vec<u8> {
        self.inner.borrow().reads.clone()
    }

    /// Forget logged traffic; register contents stay.
    pub fn clear_log(&self) {
        let mut s = self.inner.borrow_mut();
        s.writes.clear();
        s.reads.clear();
    }
}

impl DlpcState {
    fn apply_write(&mut self, opcode: u8, payload: &[u8]) {
        self.writes.push((opcode, payload.to_vec()));
        if self.drop_writes > 0 {
            self.drop_writes -= 1;
            return;
        }
        self.regs.insert(opcode, payload.to_vec());

        if opcode == REG_PRINT_LAYER_CONTROL.id() {
            match payload {
                [ctrl, d0, d1, e0, e1] if *ctrl == PrintControl::LightOn.wire() => {
                    let dark = u16::from_le_bytes([*d0, *d1]);
                    let exposure = u16::from_le_bytes([*e0, *e1]);
                    self.light_on = true;
                    self.frames_left = if exposure == 0xFFFF {
                        None
                    } else {
                        Some(u32::from(dark) + u32::from(exposure))
                    };
                }
                _ => {
                    self.light_on = false;
                    self.frames_left = None;
                }
            }
        } else if opcode == REG_OPERATING_MODE.id() && payload != [Mode::ExternalPrint.wire()] {
            self.light_on = false;
            self.frames_left = None;
        }
    }

    fn read_into(&mut self, opcode: u8, buf: &mut [u8]) {
        self.reads.push(opcode);
        let key = register_by_read_opcode(opcode).map_or(opcode, |r| r.id());
        let value = self.regs.get(&key).cloned().unwrap_or_default();
        let mut src = Vec::with_capacity(buf.len());
        if let Some(lead) = self.leading_byte {
            src.push(lead);
        }
        src.extend_from_slice(&value);
        for (i, b) in buf.iter_mut().enumerate() {
            *b = src.get(i).copied().unwrap_or(0);
        }
    }
}

impl i2c::ErrorType for SimulatedDlpc {
    type Error = ErrorKind;
}

impl I2c for SimulatedDlpc {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        let mut s = self.inner.borrow_mut();
        if s.absent || address != DLPC1438_I2C_ADDR {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        let mut pointer: Option<u8> = None;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    if let Some((&opcode, payload)) = bytes.split_first() {
                        if payload.is_empty() {
                            pointer = Some(opcode);
                        } else {
                            s.apply_write(opcode, payload);
                        }
                    }
                }
                Operation::Read(buf) => match pointer {
                    Some(opcode) => s.read_into(opcode, buf),
                    None => buf.fill(0),
                },
            }
        }
        Ok(())
    }
}

// ── Simulated DMA chain ─────────────────────────────────────────────────────

/// One call into the DMA binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEvent {
    /// Re-arm channel configured with the origin pointer.
    ConfigureRearm {
        /// Origin written back on every cycle.
        origin: usize,
    },
    /// Data channel configured.
    ConfigureData {
        /// Read start.
        origin: usize,
        /// Bytes per cycle.
        count: u32,
        /// Pacing DREQ.
        dreq: u8,
    },
    /// Data channel started.
    Trigger {
        /// Read start.
        origin: usize,
    },
    /// Re-arm channel aborted.
    AbortRearm,
    /// Data channel aborted.
    AbortData,
}

/// Simulated data/re-arm channel pair.
#[derive(Debug, Default)]
pub struct SimulatedDmaChain {
    events: Vec<ChainEvent>,
    rearm_origin: Option<usize>,
    count: u32,
    read_addr: Option<usize>,
    fail_next: bool,
    cycles: u64,
}

impl SimulatedDmaChain {
    /// Unconfigured chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next binding call.
    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }

    /// Calls received, in order.
    pub fn events(&self) -> &[ChainEvent] {
        &self.events
    }

    /// True while the data channel is running.
    pub fn running(&self) -> bool {
        self.read_addr.is_some()
    }

    /// Completed loop cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run `n` cycles over `frame` and return what the pixel FIFO received
    /// per cycle. `frame` must be the memory at the configured origin.
    ///
    /// A cycle that starts anywhere but the origin, or a chain without a
    /// re-arm channel, stops the simulation early.
    pub fn run_cycles(&mut self, frame: &[u8], n: usize) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        let base = frame.as_ptr() as usize;
        for _ in 0..n {
            let Some(start) = self.read_addr else { break };
            let Some(offset) = start.checked_sub(base) else { break };
            let end = offset + self.count as usize;
            let Some(bytes) = frame.get(offset..end) else { break };
            out.push(bytes.to_vec());
            self.cycles += 1;
            // Data channel finished; chain to re-arm, which rewrites READ_ADDR_TRIG.
            match self.rearm_origin {
                Some(origin) => self.read_addr = Some(origin),
                None => {
                    self.read_addr = None;
                    break;
                }
            }
        }
        out
    }

    fn check(&mut self) -> Result<(), ErrorKind> {
        if core::mem::take(&mut self.fail_next) {
            Err(ErrorKind::Other)
        } else {
            Ok(())
        }
    }
}

impl PixelDmaChain for SimulatedDmaChain {
    type Error = ErrorKind;

    unsafe fn configure_rearm_channel(&mut self, origin: usize) -> Result<(), Self::Error> {
        self.check()?;
        self.rearm_origin = Some(origin);
        self.events.push(ChainEvent::ConfigureRearm { origin });
        Ok(())
    }

    unsafe fn configure_data_channel(&mut self, origin: usize, count: u32, pacing_dreq: u8) -> Result<(), Self::Error> {
        self.check()?;
        self.count = count;
        self.events.push(ChainEvent::ConfigureData { origin, count, dreq: pacing_dreq });
        Ok(())
    }

    unsafe fn trigger(&mut self, origin: usize) -> Result<(), Self::Error> {
        self.check()?;
        self.read_addr = Some(origin);
        self.events.push(ChainEvent::Trigger { origin });
        Ok(())
    }

    fn abort(&mut self) -> Result<(), Self::Error> {
        self.check()?;
        self.events.push(ChainEvent::AbortRearm);
        self.events.push(ChainEvent::AbortData);
        self.read_addr = None;
        Ok(())
    }
}

// ── Simulated timing generators ─────────────────────────────────────────────

/// One call into the timing-generator binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorEvent {
    /// Active count pushed.
    Load(Generator, u32),
    /// Masked enable.
    Enable(u8),
    /// All stopped.
    DisableAll,
}

/// Records loads and enables; tracks which generators run.
#[derive(Debug, Default)]
pub struct SimulatedTimingGenerators {
    events: Vec<GeneratorEvent>,
    loaded: u8,
    running: u8,
}

impl SimulatedTimingGenerators {
    /// All stopped, nothing loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls received, in order.
    pub fn events(&self) -> &[GeneratorEvent] {
        &self.events
    }

    /// Enable mask of running generators.
    pub fn running(&self) -> u8 {
        self.running
    }

    /// True when every generator was loaded and then started by one enable.
    pub fn in_phase(&self) -> bool {
        let enables: Vec<u8> = self
            .events
            .iter()
            .filter_map(|e| match e {
                GeneratorEvent::Enable(m) => Some(*m),
                _ => None,
            })
            .collect();
        self.running == ALL_GENERATORS && self.loaded == ALL_GENERATORS && enables == [ALL_GENERATORS]
    }
}

impl TimingGenerators for SimulatedTimingGenerators {
    type Error = core::convert::Infallible;

    fn load_active_count(&mut self, generator: Generator, count: u32) -> Result<(), Self::Error> {
        self.loaded |= generator.mask_bit();
        self.events.push(GeneratorEvent::Load(generator, count));
        Ok(())
    }

    fn enable_in_sync(&mut self, mask: u8) -> Result<(), Self::Error> {
        self.running |= mask;
        self.events.push(GeneratorEvent::Enable(mask));
        Ok(())
    }

    fn disable_all(&mut self) -> Result<(), Self::Error> {
        self.running = 0;
        self.events.push(GeneratorEvent::DisableAll);
        Ok(())
    }
}

// ── Pins and delay ──────────────────────────────────────────────────────────

/// Input pin replaying a script of levels; output pin recording levels.
///
/// Once the script runs out the last level repeats.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPin {
    script: Vec<bool>,
    pos: usize,
    failing: bool,
    driven: Vec<bool>,
}

impl ScriptedPin {
    /// Replay `levels` (`true` = high).
    pub fn new(levels: &[bool]) -> Self {
        Self { script: levels.to_vec(), ..Self::default() }
    }

    /// Every read and write fails.
    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    /// Levels driven so far.
    pub fn driven(&self) -> &[bool] {
        &self.driven
    }

    /// Samples taken so far.
    pub fn samples(&self) -> usize {
        self.pos
    }
}

impl digital::ErrorType for ScriptedPin {
    type Error = digital::ErrorKind;
}

impl InputPin for ScriptedPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        if self.failing {
            return Err(digital::ErrorKind::Other);
        }
        let level = self.script.get(self.pos).or(self.script.last()).copied().unwrap_or(false);
        self.pos += 1;
        Ok(level)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|h| !h)
    }
}

impl OutputPin for ScriptedPin {
    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.failing {
            return Err(digital::ErrorKind::Other);
        }
        self.driven.push(true);
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.failing {
            return Err(digital::ErrorKind::Other);
        }
        self.driven.push(false);
        Ok(())
    }
}

/// Delay that returns at once and records what was asked for.
#[derive(Debug, Clone, Default)]
pub struct RecordingDelay {
    calls_ms: Vec<u32>,
    sub_ms_ns: u64,
}

impl RecordingDelay {
    /// No calls yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Millisecond delays in call order.
    pub fn calls_ms(&self) -> &[u32] {
        &self.calls_ms
    }

    /// Total requested time, in whole milliseconds.
    pub fn total_ms(&self) -> u64 {
        self.calls_ms.iter().map(|&ms| u64::from(ms)).sum::<u64>() + self.sub_ms_ns / 1_000_000
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.sub_ms_ns += u64::from(ns);
    }

    fn delay_us(&mut self, us: u32) {
        self.sub_ms_ns += u64::from(us) * 1_000;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.calls_ms.push(ms);
    }
}
