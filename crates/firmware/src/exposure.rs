//! Per-layer exposure orchestration.
//!
//! One layer cycle:
//!
//! ```text
//!   ensure DMA loop streams the framebuffer
//!     → park the controller in Standby (light off)
//!     → clear and repack the framebuffer
//!     → Standby → ExternalPrintConfigured → ExternalPrintActive
//!     → hold for the exposure
//!     → ExternalPrintActive → Standby
//! ```
//!
//! The framebuffer is only touched while the light is off. The transfer
//! engine keeps streaming throughout; a torn frame is never lit.
//!
//! If anything fails after the light may be on, the orchestrator tries to
//! return the controller to Standby before reporting the original error.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;
use platform::{
    BoardConfig, ControlError, DeviceState, DlpcController, EngineState, ExposureTiming,
    ExternalPrintConfig, FrameCount, Framebuffer, FramebufferError, IlluminationPwm,
    ImageOrientation, PixelDmaChain, TransferEngine, TransferError,
};
use thiserror_no_std::Error;

/// Dark frames shown before the lit frames unless a layer asks otherwise.
/// TI recommends at least three.
pub const DEFAULT_DARK_FRAMES: FrameCount = FrameCount::new(3);

/// Exposure failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExposureError {
    /// Control-path failure; see [`ControlError::is_fatal`].
    #[error("control: {0}")]
    Control(#[from] ControlError),
    /// The transfer engine could not be started.
    #[error("transfer: {0}")]
    Transfer(#[from] TransferError),
    /// The layer image did not fit the framebuffer.
    #[error("framebuffer: {0}")]
    Framebuffer(#[from] FramebufferError),
    /// The DMA loop is not configured for this framebuffer.
    #[error("video is not streaming the framebuffer")]
    VideoNotStreaming,
    /// An indefinite exposure has no end unless the caller gives a hold time.
    #[error("indefinite exposure needs an explicit hold time")]
    IndefiniteExposureWithoutHold,
}

impl ExposureError {
    /// True when the error came from the one fatal control check.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Control(e) if e.is_fatal())
    }
}

/// Print-mode settings shared by every layer of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintSettings {
    /// Degamma and illuminator select.
    pub print: ExternalPrintConfig,
    /// Image flips.
    pub orientation: ImageOrientation,
    /// Frame period used to derive hold times.
    pub timing: ExposureTiming,
}

impl PrintSettings {
    /// Linear gamma, no flips, board frame period.
    pub const fn from_board(config: &BoardConfig) -> Self {
        Self { print: ExternalPrintConfig::LINEAR, orientation: ImageOrientation::NONE, timing: config.exposure }
    }
}

/// One layer's exposure parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layer {
    /// LED duty.
    pub pwm: IlluminationPwm,
    /// Dark frames before the light comes on.
    pub dark_frames: FrameCount,
    /// Lit frames, or [`FrameCount::INDEFINITE`].
    pub exposure_frames: FrameCount,
    /// Hold time; derived from the frame counts when `None`.
    pub hold_ms: Option<u32>,
}

impl Layer {
    /// `exposure_frames` lit frames at `pwm`, after [`DEFAULT_DARK_FRAMES`].
    pub const fn new(pwm: IlluminationPwm, exposure_frames: FrameCount) -> Self {
        Self { pwm, dark_frames: DEFAULT_DARK_FRAMES, exposure_frames, hold_ms: None }
    }

    /// Override the dark frame count.
    #[must_use]
    pub const fn with_dark_frames(mut self, dark_frames: FrameCount) -> Self {
        self.dark_frames = dark_frames;
        self
    }

    /// Hold for `hold_ms` regardless of the frame counts.
    #[must_use]
    pub const fn with_hold_ms(mut self, hold_ms: u32) -> Self {
        self.hold_ms = Some(hold_ms);
        self
    }

    /// Time to hold the light on, rounded up to whole milliseconds.
    pub fn hold_time_ms(&self, timing: ExposureTiming) -> Result<u32, ExposureError> {
        if let Some(ms) = self.hold_ms {
            return Ok(ms);
        }
        frames_to_ms(self.dark_frames, self.exposure_frames, timing)
            .ok_or(ExposureError::IndefiniteExposureWithoutHold)
    }
}

/// `(dark + exposure) × frame period`, rounded up. `None` for an indefinite exposure.
pub fn frames_to_ms(dark: FrameCount, exposure: FrameCount, timing: ExposureTiming) -> Option<u32> {
    if exposure.is_indefinite() {
        return None;
    }
    let frames = u64::from(dark.get()).saturating_add(u64::from(exposure.get()));
    let us = frames.saturating_mul(u64::from(timing.frame_period_us));
    Some(u32::try_from(us.div_ceil(1_000)).unwrap_or(u32::MAX))
}

/// Outcome of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerReport {
    /// Zero-based layer number within the orchestrator's lifetime.
    pub index: u32,
    /// Time the light was held on.
    pub hold_ms: u32,
    /// Read-back mismatches logged during this layer.
    pub readback_mismatches: u32,
}

/// Totals for a multi-layer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobReport {
    /// Layers exposed.
    pub layers: u32,
    /// Sum of hold times.
    pub total_hold_ms: u64,
    /// Read-back mismatches across the job.
    pub readback_mismatches: u32,
}

/// Sequences the controller against the transfer engine, one layer at a time.
pub struct ExposureOrchestrator<I, PWR, RDY, D, C, B> {
    controller: DlpcController<I, PWR, RDY, D>,
    engine: TransferEngine<C>,
    framebuffer: Framebuffer<B>,
    settings: PrintSettings,
    layers_done: u32,
}

impl<I, PWR, RDY, D, C, B> ExposureOrchestrator<I, PWR, RDY, D, C, B>
where
    I: I2c,
    PWR: OutputPin,
    RDY: InputPin,
    D: DelayNs,
    C: PixelDmaChain,
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Take ownership of the brought-up parts.
    ///
    /// `B` must not store the pixels inline: the DMA loop holds their
    /// address, so moving the framebuffer must not move its bytes.
    pub fn new(
        controller: DlpcController<I, PWR, RDY, D>,
        engine: TransferEngine<C>,
        framebuffer: Framebuffer<B>,
        settings: PrintSettings,
    ) -> Self {
        Self { controller, engine, framebuffer, settings, layers_done: 0 }
    }

    /// The controller.
    pub fn controller(&self) -> &DlpcController<I, PWR, RDY, D> {
        &self.controller
    }

    /// The controller, mutably (test patterns, diagnostics).
    pub fn controller_mut(&mut self) -> &mut DlpcController<I, PWR, RDY, D> {
        &mut self.controller
    }

    /// The transfer engine.
    pub fn engine(&self) -> &TransferEngine<C> {
        &self.engine
    }

    /// The framebuffer.
    pub fn framebuffer(&self) -> &Framebuffer<B> {
        &self.framebuffer
    }

    /// Layers exposed so far.
    pub fn layers_done(&self) -> u32 {
        self.layers_done
    }

    /// Hand back the parts.
    pub fn into_parts(self) -> (DlpcController<I, PWR, RDY, D>, TransferEngine<C>, Framebuffer<B>) {
        (self.controller, self.engine, self.framebuffer)
    }

    /// Expose one layer. `draw` packs the image into a cleared framebuffer.
    pub fn run_layer<F>(&mut self, layer: &Layer, draw: F) -> Result<LayerReport, ExposureError>
    where
        F: FnOnce(&mut Framebuffer<B>) -> Result<(), FramebufferError>,
    {
        let hold_ms = layer.hold_time_ms(self.settings.timing)?;
        self.ensure_streaming()?;
        let mismatches_before = self.controller.readback_mismatches();

        self.park()?;
        self.framebuffer.clear();
        draw(&mut self.framebuffer)?;

        let index = self.layers_done;
        info!("layer {} start: pwm {}, hold {} ms", index, layer.pwm.get(), hold_ms);
        if let Err(e) = self.expose_and_hold(layer, hold_ms) {
            self.recover();
            return Err(e);
        }
        info!("layer {} done", index);

        self.layers_done = self.layers_done.saturating_add(1);
        Ok(LayerReport {
            index,
            hold_ms,
            readback_mismatches: self.controller.readback_mismatches().saturating_sub(mismatches_before),
        })
    }

    /// Expose pre-packed images one after another, returning to Standby
    /// between layers. Stops at the first failure.
    pub fn run_job<'img, L>(&mut self, layers: L) -> Result<JobReport, ExposureError>
    where
        L: IntoIterator<Item = (Layer, &'img [u8])>,
    {
        let mut report = JobReport::default();
        for (layer, image) in layers {
            let r = self.run_layer(&layer, |fb| fb.load_packed(image))?;
            report.layers = report.layers.saturating_add(1);
            report.total_hold_ms = report.total_hold_ms.saturating_add(u64::from(r.hold_ms));
            report.readback_mismatches = report.readback_mismatches.saturating_add(r.readback_mismatches);
        }
        info!("job complete: {} layers, {} ms lit", report.layers, report.total_hold_ms);
        Ok(report)
    }

    /// Light off, Standby, DMA loop halted. Safe to call more than once.
    pub fn shutdown(&mut self) -> Result<(), ExposureError> {
        if self.controller.state() != DeviceState::Uninitialized {
            self.controller.enter_standby()?;
        }
        if self.engine.is_streaming() {
            self.engine.halt()?;
        }
        info!("shutdown: controller in standby, video halted");
        Ok(())
    }

    fn ensure_streaming(&mut self) -> Result<(), ExposureError> {
        let bound = self.engine.origin() == self.framebuffer.origin_address()
            && usize::try_from(self.engine.transfer_count()).ok() == Some(self.framebuffer.len());
        match self.engine.state() {
            EngineState::Idle => Err(ExposureError::VideoNotStreaming),
            _ if !bound => {
                error!("dma loop is not bound to the framebuffer");
                Err(ExposureError::VideoNotStreaming)
            }
            EngineState::Armed => {
                warn!("dma loop was halted; restarting");
                self.engine.start()?;
                Ok(())
            }
            EngineState::Streaming => Ok(()),
        }
    }

    fn park(&mut self) -> Result<(), ControlError> {
        if self.controller.state() == DeviceState::Standby {
            Ok(())
        } else {
            self.controller.enter_standby()
        }
    }

    fn expose_and_hold(&mut self, layer: &Layer, hold_ms: u32) -> Result<(), ExposureError> {
        self.controller.configure_external_print(self.settings.print, self.settings.orientation)?;
        self.controller.expose(layer.pwm, layer.dark_frames, layer.exposure_frames)?;
        self.controller.delay_mut().delay_ms(hold_ms);
        self.controller.enter_standby()?;
        Ok(())
    }

    fn recover(&mut self) {
        if let Err(e) = self.controller.enter_standby() {
            error!("could not return to standby: {}", e.as_str());
        }
    }
}
