//! Hardware abstraction layer for the DLP Pico light engine.
//!
//! Drives a TI DLPC1438 display controller from an RP2040: a packed
//! framebuffer streamed over a parallel video port by a self-re-arming DMA
//! loop, and an I2C control channel that walks the controller through its
//! power-on handshake, mode switches and exposure commands.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (firmware crate: boot, exposure orchestrator, demos)
//!         ↓
//! Platform HAL (this crate)
//!   framebuffer ─▶ dma (TransferEngine) ─▶ video_timing (TimingGenerators)
//!   dlpc1438 ─▶ control_bus ─▶ controller (DlpcController) ◀─ handshake
//!         ↓
//! Hardware binding (RP2040 HAL: PIO programs, DMA channels, I2C, GPIO)
//! ```
//!
//! Hardware bindings plug in through `embedded-hal` 1.0 traits
//! (`I2c`, `InputPin`, `OutputPin`, `DelayNs`) and the two seams defined
//! here, [`PixelDmaChain`] and [`TimingGenerators`].
//!
//! # Features
//!
//! - `std`: simulated peripherals in [`mocks`] (emulator, integration tests)
//! - `defmt`: log through defmt and derive `defmt::Format` on public types
//! - `tracing`: log through tracing (desktop builds)
//!
//! # Example
//!
//! ```ignore
//! use platform::{BoardConfig, DlpcController, TestPattern};
//! # use platform::mocks::{RecordingDelay, ScriptedPin, SimulatedDlpc};
//!
//! let cfg = BoardConfig::dlp_pico();
//! # let (i2c, power, ready, delay) =
//! #     (SimulatedDlpc::new(), ScriptedPin::new(&[]), ScriptedPin::new(&[]), RecordingDelay::new());
//! let mut dlpc = DlpcController::new(i2c, power, ready, delay, cfg.controller);
//! dlpc.power_on()?;
//! dlpc.enter_test_pattern(TestPattern::GRID_240)?;
//! # Ok::<(), platform::ControlError>(())
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // register names and hex opcodes in doc comments
#![allow(clippy::must_use_candidate)] // register accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[cfg(all(feature = "std", not(test)))]
extern crate std;

#[macro_use]
mod fmt;

pub mod config;
pub mod control_bus;
pub mod controller;
pub mod dlpc1438;
pub mod dma;
pub mod dma_safety;
pub mod error;
pub mod framebuffer;
pub mod handshake;
pub mod mocks;
pub mod video_timing;

pub use config::{BoardConfig, BusFrequencyHz, ExposureTiming, PinError, PinRole, Pins};
pub use control_bus::{BusScan, ControlBus, ReadOutcome, ReadQuirk};
pub use controller::{
    ControllerConfig, DeviceState, DlpcController, NackPolicy, SettleDelays, VerifyPolicy,
};
pub use dlpc1438::{
    ExternalPrintConfig, FrameCount, IlluminationPwm, ImageOrientation, Mode, OutOfRangeError,
    PrintLayerCommand, TestPattern,
};
pub use dma::{EngineState, PixelDmaChain, TransferEngine, TransferError};
pub use error::ControlError;
pub use framebuffer::{BitOrder, BitsPerPixel, Framebuffer, FramebufferError, PixelFormat};
pub use handshake::{HandshakeOutcome, ReadyPolicy};
pub use video_timing::{Generator, TimingGenerators, VideoTiming};
