//! Bring-up sequence for the DLP Pico.
//!
//! Initialization order (MUST be respected):
//!   1. Zero the framebuffer
//!   2. Arm the DMA chain (re-arm channel, then data channel)
//!   3. Load the four timing-generator active counts
//!   4. Start all generators in one masked enable
//!   5. Trigger the DMA loop
//!   6. Power the DLPC1438 and wait for ready
//!
//! Video is running before the controller is powered, so the controller
//! finds a locked parallel port as soon as it leaves reset.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;
use platform::dma_safety;
use platform::video_timing::{start_video, TimingGenerators};
use platform::{
    BoardConfig, ControlError, DlpcController, Framebuffer, FramebufferError, HandshakeOutcome,
    PixelDmaChain, TransferEngine, TransferError,
};
use thiserror_no_std::Error;

/// Ordered list of boot sequence steps for documentation and testing.
///
/// # Correctness Invariants
///
/// - The re-arm channel is configured before the data channel, so the first
///   completion of the data channel always has somewhere to chain to.
/// - Every active count is loaded before the single masked enable. A
///   generator started on its own runs out of phase and the controller
///   never locks.
/// - The DMA loop starts after the generators: the pixel FIFO's DREQ is
///   what paces it.
pub const BOOT_SEQUENCE_STEPS: &[&str] = &[
    "1. Framebuffer: zero the scan-out buffer",
    "2. DMA: configure re-arm channel, then data channel paced by the pixel FIFO DREQ",
    "3. Timing generators: load HSYNC, VSYNC, DATAEN_CMD and PCLK active counts",
    "4. Timing generators: start all four in one masked enable",
    "5. DMA: trigger the data channel from the framebuffer origin",
    "6. DLPC1438: assert PROJ_ON, wait for HOST_IRQ or fall back to a fixed settle",
];

/// Bring-up failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BootError {
    /// Framebuffer geometry does not match the board.
    #[error("framebuffer: {0}")]
    Framebuffer(#[from] FramebufferError),
    /// A timing generator refused its count or the enable.
    #[error("timing generators failed to start")]
    Video,
    /// The DMA chain could not be armed or started.
    #[error("transfer engine: {0}")]
    Transfer(#[from] TransferError),
    /// The controller handshake failed.
    #[error("controller: {0}")]
    Control(#[from] ControlError),
}

/// What bring-up observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootReport {
    /// How the ready handshake completed.
    pub handshake: HandshakeOutcome,
    /// Bytes the DMA loop moves per cycle.
    pub transfer_count: u32,
    /// True when the framebuffer lies in RP2040 SRAM (false on the host).
    pub framebuffer_in_sram: bool,
}

/// Run [`BOOT_SEQUENCE_STEPS`] in order.
///
/// # Safety
///
/// The DMA loop keeps reading the framebuffer's bytes after this returns.
/// Those bytes must stay allocated and must not move until `engine` is
/// halted, so `B` must not store them inline (a `&'static mut [u8]` or a
/// heap buffer, not an array). See [`TransferEngine::configure`].
pub unsafe fn bring_up<B, C, T, I, PWR, RDY, D>(
    config: &BoardConfig,
    framebuffer: &mut Framebuffer<B>,
    generators: &mut T,
    engine: &mut TransferEngine<C>,
    controller: &mut DlpcController<I, PWR, RDY, D>,
) -> Result<BootReport, BootError>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
    C: PixelDmaChain,
    T: TimingGenerators,
    I: I2c,
    PWR: OutputPin,
    RDY: InputPin,
    D: DelayNs,
{
    let expected = config.framebuffer_len();
    if framebuffer.len() != expected || framebuffer.format() != config.pixel_format {
        return Err(FramebufferError::ImageSizeMismatch { expected, actual: framebuffer.len() }.into());
    }

    framebuffer.clear();
    let origin = framebuffer.origin_address();
    let framebuffer_in_sram = dma_safety::in_sram(origin, framebuffer.len());
    if !framebuffer_in_sram {
        debug!("framebuffer at {:#x} is outside RP2040 SRAM (host build)", origin);
    }

    // SAFETY: the caller keeps the framebuffer's bytes in place while streaming.
    unsafe { engine.configure(origin, framebuffer.len(), config.pixel_dreq) }?;
    start_video(generators, &config.video).map_err(|_| {
        error!("timing generators failed to start");
        BootError::Video
    })?;
    engine.start()?;

    let handshake = controller.power_on()?;
    info!("bring-up complete: {}x{}, {} bytes per frame", config.width, config.height, expected);

    Ok(BootReport { handshake, transfer_count: engine.transfer_count(), framebuffer_in_sram })
}
