//! Self-re-arming framebuffer transfer engine.
//!
//! Two chained DMA channels stream the framebuffer into the pixel
//! generator's intake FIFO forever:
//!
//! ```text
//!   data channel:  framebuffer[0..N] ──▶ pixel FIFO   (paced by FIFO DREQ)
//!        │ on completion, chain to
//!        ▼
//!   re-arm channel: &origin ──▶ data.READ_ADDR_TRIG   (1 word)
//!        │ the write re-triggers the data channel from the origin
//!        └──────────────────────────────────────────────┘
//! ```
//!
//! Once started the loop needs no CPU time. Every cycle moves exactly `N`
//! bytes because the re-arm write lands before the data channel can run dry.
//!
//! The engine does not synchronise with drawing. The orchestrator gates the
//! light, not the pipeline.

use thiserror_no_std::Error;

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineState {
    /// Nothing configured.
    Idle,
    /// Both channels configured, not running.
    Armed,
    /// Looping.
    Streaming,
}

impl EngineState {
    /// Name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Streaming => "streaming",
        }
    }
}

/// Transfer engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferError {
    /// `start` before `configure`.
    #[error("transfer engine is not armed")]
    NotArmed,
    /// `halt` while not streaming.
    #[error("transfer engine is not streaming")]
    NotStreaming,
    /// `configure` or `start` while the loop is running.
    #[error("transfer engine is already streaming")]
    AlreadyStreaming,
    /// Zero-length framebuffer.
    #[error("framebuffer is empty")]
    EmptyFramebuffer,
    /// Framebuffer longer than one DMA transfer count can express.
    #[error("framebuffer of {len} bytes exceeds the transfer count")]
    TooLong {
        /// Requested length in bytes.
        len: usize,
    },
    /// The DMA binding reported a failure.
    #[error("DMA hardware error")]
    Hardware,
}

/// Hardware binding for the two chained channels.
///
/// On RP2040 the data channel reads incrementing from the framebuffer and
/// writes the PIO TX FIFO without incrementing; the re-arm channel copies one
/// word (the origin pointer) into the data channel's read-address trigger
/// alias.
///
/// The methods that take an origin are `unsafe`: a real binding hands the
/// address to the DMA engine, which reads it with no borrow checking.
pub trait PixelDmaChain {
    /// Binding-specific failure.
    type Error;

    /// Configure the re-arm channel to write `origin` into the data channel's
    /// read-address trigger register. Must not start anything.
    ///
    /// # Safety
    ///
    /// Same contract as [`TransferEngine::configure`].
    unsafe fn configure_rearm_channel(&mut self, origin: usize) -> Result<(), Self::Error>;

    /// Configure the data channel: `count` bytes from `origin` into the pixel
    /// FIFO, paced by `pacing_dreq`, chaining to the re-arm channel on
    /// completion. Must not start anything.
    ///
    /// # Safety
    ///
    /// `origin..origin + count` must stay valid for reads while the channel runs.
    unsafe fn configure_data_channel(&mut self, origin: usize, count: u32, pacing_dreq: u8) -> Result<(), Self::Error>;

    /// Start the data channel reading from `origin`.
    ///
    /// # Safety
    ///
    /// `origin` must be the address both channels were configured with.
    unsafe fn trigger(&mut self, origin: usize) -> Result<(), Self::Error>;

    /// Stop both channels, re-arm channel first so it cannot restart the data channel.
    fn abort(&mut self) -> Result<(), Self::Error>;
}

/// Transfer engine over a [`PixelDmaChain`].
pub struct TransferEngine<C> {
    chain: C,
    state: EngineState,
    origin: usize,
    count: u32,
}

impl<C: PixelDmaChain> TransferEngine<C> {
    /// Create an idle engine. Nothing is configured.
    pub fn new(chain: C) -> Self {
        Self { chain, state: EngineState::Idle, origin: 0, count: 0 }
    }

    /// Lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// True while looping.
    pub fn is_streaming(&self) -> bool {
        self.state == EngineState::Streaming
    }

    /// Framebuffer origin the loop re-arms to.
    pub fn origin(&self) -> usize {
        self.origin
    }

    /// Bytes per loop cycle.
    pub fn transfer_count(&self) -> u32 {
        self.count
    }

    /// The DMA binding.
    pub fn chain(&self) -> &C {
        &self.chain
    }

    /// The DMA binding, mutably. Simulations advance cycles through this.
    pub fn chain_mut(&mut self) -> &mut C {
        &mut self.chain
    }

    /// Hand back the binding.
    pub fn release(self) -> C {
        self.chain
    }

    /// Idle | Armed → Armed: bind both channels to `len` bytes at `origin`.
    ///
    /// # Safety
    ///
    /// Once started, the loop reads `origin..origin + len` on every cycle
    /// with no borrow tying that memory to the engine. The memory must stay
    /// allocated and must not move until the engine is halted (or dropped
    /// while halted). Writes into it while streaming are fine: they show up
    /// in the next cycle.
    pub unsafe fn configure(&mut self, origin: usize, len: usize, pacing_dreq: u8) -> Result<(), TransferError> {
        if self.state == EngineState::Streaming {
            return Err(TransferError::AlreadyStreaming);
        }
        if len == 0 {
            return Err(TransferError::EmptyFramebuffer);
        }
        let count = u32::try_from(len).map_err(|_| TransferError::TooLong { len })?;

        // SAFETY: the caller upholds this function's contract for `origin..origin + len`.
        unsafe {
            self.chain.configure_rearm_channel(origin).map_err(|_| TransferError::Hardware)?;
            self.chain
                .configure_data_channel(origin, count, pacing_dreq)
                .map_err(|_| TransferError::Hardware)?;
        }

        self.origin = origin;
        self.count = count;
        self.set_state(EngineState::Armed);
        debug!("dma chain armed: {} bytes per cycle, dreq {}", count, pacing_dreq);
        Ok(())
    }

    /// Armed → Streaming: trigger the data channel from the origin.
    pub fn start(&mut self) -> Result<(), TransferError> {
        match self.state {
            EngineState::Idle => Err(TransferError::NotArmed),
            EngineState::Streaming => Err(TransferError::AlreadyStreaming),
            EngineState::Armed => {
                // SAFETY: Armed is only reached through `configure`, whose caller
                // keeps `origin` valid until the engine is halted.
                unsafe { self.chain.trigger(self.origin) }.map_err(|_| TransferError::Hardware)?;
                self.set_state(EngineState::Streaming);
                Ok(())
            }
        }
    }

    /// Streaming → Armed: abort both channels. A later `start` resumes from the origin.
    pub fn halt(&mut self) -> Result<(), TransferError> {
        if self.state != EngineState::Streaming {
            return Err(TransferError::NotStreaming);
        }
        self.chain.abort().map_err(|_| {
            error!("dma abort failed");
            TransferError::Hardware
        })?;
        self.set_state(EngineState::Armed);
        Ok(())
    }

    fn set_state(&mut self, to: EngineState) {
        info!("transfer engine {} -> {}", self.state.as_str(), to.as_str());
        self.state = to;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::mocks::{ChainEvent, SimulatedDmaChain};

    const ORIGIN: usize = 0x2000_0000;

    fn arm(engine: &mut TransferEngine<SimulatedDmaChain>, origin: usize, len: usize, dreq: u8) -> Result<(), TransferError> {
        // SAFETY: the simulated chain records the origin and never reads through it.
        unsafe { engine.configure(origin, len, dreq) }
    }

    #[test]
    fn lifecycle_idle_armed_streaming() {
        let mut engine = TransferEngine::new(SimulatedDmaChain::new());
        assert_eq!(engine.start(), Err(TransferError::NotArmed));
        arm(&mut engine, ORIGIN, 230_400, 0).unwrap();
        assert_eq!(engine.state(), EngineState::Armed);
        engine.start().unwrap();
        assert!(engine.is_streaming());
        assert_eq!(engine.start(), Err(TransferError::AlreadyStreaming));
        assert_eq!(arm(&mut engine, ORIGIN, 16, 0), Err(TransferError::AlreadyStreaming));
    }

    #[test]
    fn rearm_channel_is_configured_before_data_channel() {
        let mut engine = TransferEngine::new(SimulatedDmaChain::new());
        arm(&mut engine, ORIGIN, 64, 3).unwrap();
        engine.start().unwrap();
        assert_eq!(
            engine.chain().events(),
            [
                ChainEvent::ConfigureRearm { origin: ORIGIN },
                ChainEvent::ConfigureData { origin: ORIGIN, count: 64, dreq: 3 },
                ChainEvent::Trigger { origin: ORIGIN },
            ]
        );
    }

    #[test]
    fn halt_aborts_and_restart_resumes_from_origin() {
        let mut engine = TransferEngine::new(SimulatedDmaChain::new());
        assert_eq!(engine.halt(), Err(TransferError::NotStreaming));
        arm(&mut engine, ORIGIN, 64, 0).unwrap();
        engine.start().unwrap();
        engine.halt().unwrap();
        assert_eq!(engine.state(), EngineState::Armed);
        engine.start().unwrap();
        assert_eq!(engine.chain().events().last(), Some(&ChainEvent::Trigger { origin: ORIGIN }));
    }

    #[test]
    fn empty_framebuffer_is_rejected() {
        let mut engine = TransferEngine::new(SimulatedDmaChain::new());
        assert_eq!(arm(&mut engine, ORIGIN, 0, 0), Err(TransferError::EmptyFramebuffer));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn hardware_failure_leaves_state_unchanged() {
        let mut chain = SimulatedDmaChain::new();
        chain.fail_next();
        let mut engine = TransferEngine::new(chain);
        assert_eq!(arm(&mut engine, ORIGIN, 64, 0), Err(TransferError::Hardware));
        assert_eq!(engine.state(), EngineState::Idle);
    }
}
