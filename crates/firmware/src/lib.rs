//! DLP Pico firmware
//!
//! Drives a DLPC1438 light engine from an RP2040 for resin printing: streams
//! a packed framebuffer over the parallel video port and sequences the
//! controller through per-layer exposures.
//!
//! # Architecture
//!
//! ```text
//! Application Layer (boot, exposure, patterns)
//!         ↓
//! Platform HAL (platform crate: framebuffer, transfer engine, controller)
//!         ↓
//! Hardware binding (RP2040 PIO + DMA, I2C, GPIO)
//! ```
//!
//! # Features
//!
//! - `hardware` - RP2040 builds: PIO/DMA binding, `firmware` binary, logs through defmt
//! - `emulator` - desktop run against simulated peripherals (tracing)
//! - `std` - Enable standard library (for emulator and testing)
//!
//! # Examples
//!
//! ```bash
//! RUST_LOG=info cargo run --example exposure_emulator --features emulator
//! cargo build -p firmware --bin firmware --features hardware --target thumbv6m-none-eabi --release
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
// Upgrade relevant warns to deny; keep pedantic as warn (too noisy for firmware)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
// Logging discipline
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![warn(clippy::dbg_macro)] // dbg! should not be left in committed code
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)] // common in Rust crates; not a real issue
#![allow(clippy::missing_errors_doc)] // most errors are self-explanatory
// Pedantic lints too noisy for firmware application code:
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::similar_names)]

#[macro_use]
mod fmt;

pub mod boot;
pub mod exposure;
#[cfg(feature = "hardware")]
pub mod hardware;
pub mod patterns;

// Re-export key types
pub use boot::{bring_up, BootError, BootReport, BOOT_SEQUENCE_STEPS};
pub use exposure::{ExposureError, ExposureOrchestrator, JobReport, Layer, LayerReport, PrintSettings};
pub use platform::dma_safety::{FRAMEBUFFER_SIZE_BYTES, FRAME_HEIGHT, FRAME_WIDTH};
