//! RP2040 bindings for the scan-out pipeline.
//!
//! [`PioTimingGenerators`] runs the four timing programs on PIO0 and
//! [`RpDmaChain`] drives the two chained DMA channels. Both implement the
//! platform traits, so [`crate::bring_up`] and the exposure orchestrator run
//! on the target exactly as they do against the simulated peripherals.
//!
//! Resources used:
//!
//! ```text
//!   PIO0 SM0  hsync      GPIO 19
//!   PIO0 SM1  vsync      GPIO 17
//!   PIO0 SM2  pixel data GPIO 8..=15, DATAEN_CMD GPIO 18 (side-set)
//!   PIO0 SM3  pclk       GPIO 16
//!   DMA  CH0  framebuffer -> SM2 TX FIFO, paced by DREQ_PIO0_TX2
//!   DMA  CH1  &origin -> CH0 READ_ADDR_TRIG
//! ```

mod dma_chain;
mod pio_timing;

pub use dma_chain::{RpDmaChain, RpDmaError};
pub use pio_timing::{PioTimingError, PioTimingGenerators, VideoPins, PIXEL_SM};

use platform::{ControlError, FramebufferError, PinError};
use thiserror_no_std::Error;

use crate::boot::BootError;
use crate::exposure::ExposureError;

/// Anything that stops the firmware before or during the exposure loop.
///
/// Logged through `defmt::Display2Format`: the control errors carry
/// embedded-hal's `ErrorKind`, which has no defmt encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartupError {
    /// A driver was handed a GPIO the board does not assign to it.
    #[error("pin assignment: {0}")]
    Pins(#[from] PinError),
    /// PIO programs could not be loaded.
    #[error("timing generators: {0}")]
    Video(#[from] PioTimingError),
    /// Static framebuffer does not fit the board geometry.
    #[error("framebuffer: {0}")]
    Framebuffer(#[from] FramebufferError),
    /// Bring-up sequence failed.
    #[error("bring-up: {0}")]
    Boot(#[from] BootError),
    /// Controller command outside an exposure.
    #[error("controller: {0}")]
    Control(#[from] ControlError),
    /// A layer failed.
    #[error("exposure: {0}")]
    Exposure(#[from] ExposureError),
}
