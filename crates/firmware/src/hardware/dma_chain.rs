//! Chained DMA pair on the RP2040.
//!
//! The data channel streams the framebuffer into the pixel FIFO one byte per
//! DREQ, then chains to the re-arm channel. The re-arm channel copies the
//! origin word from [`REARM_SOURCE`] into the data channel's
//! `READ_ADDR_TRIG` alias, which rewinds and retriggers it. Control words go
//! through the `AL1_CTRL` alias so configuring a channel never starts it.

use core::sync::atomic::{compiler_fence, AtomicU32, Ordering};

use embassy_rp::dma::Channel;
use embassy_rp::pac;
use embassy_rp::pac::dma::regs::CtrlTrig;
use embassy_rp::pac::dma::vals::{DataSize, TreqSel};
use embassy_rp::Peri;
use platform::dma_safety::in_sram;
use platform::PixelDmaChain;
use thiserror_no_std::Error;

/// Word the re-arm channel reads. Holds the framebuffer origin.
static REARM_SOURCE: AtomicU32 = AtomicU32::new(0);

/// Busy-wait bound for `CHAN_ABORT` to clear.
const ABORT_SPINS: u32 = 100_000;

/// Highest TREQ number wired to a peripheral.
const MAX_DREQ: u8 = 0x3A;

/// Errors from the DMA binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RpDmaError {
    /// Buffer lies outside SRAM.
    #[error("buffer {:#x}+{} outside SRAM", .origin, .len)]
    NotInSram { origin: u32, len: u32 },
    /// Address does not fit the 32-bit bus.
    #[error("address does not fit the DMA bus")]
    AddressWidth,
    /// TREQ number past the last peripheral request.
    #[error("DREQ {} not a peripheral request", .dreq)]
    Dreq { dreq: u8 },
    /// `CHAN_ABORT` still set after the busy-wait bound.
    #[error("DMA abort did not complete")]
    AbortTimeout,
}

/// Data channel `D` plus re-arm channel `R`.
pub struct RpDmaChain<'d, D: Channel, R: Channel> {
    data: Peri<'d, D>,
    rearm: Peri<'d, R>,
    fifo: u32,
}

impl<'d, D: Channel, R: Channel> RpDmaChain<'d, D, R> {
    /// Claim both channels. `fifo` is the TX FIFO the data channel writes.
    pub fn new(data: Peri<'d, D>, rearm: Peri<'d, R>, fifo: u32) -> Self {
        Self { data, rearm, fifo }
    }

    fn channel_mask(&self) -> u16 {
        channel_bit(self.data.number()) | channel_bit(self.rearm.number())
    }
}

fn channel_bit(number: u8) -> u16 {
    1u16.checked_shl(u32::from(number)).unwrap_or(0)
}

fn bus_address(addr: usize) -> Result<u32, RpDmaError> {
    u32::try_from(addr).map_err(|_| RpDmaError::AddressWidth)
}

impl<D: Channel, R: Channel> PixelDmaChain for RpDmaChain<'_, D, R> {
    type Error = RpDmaError;

    unsafe fn configure_rearm_channel(&mut self, origin: usize) -> Result<(), RpDmaError> {
        REARM_SOURCE.store(bus_address(origin)?, Ordering::Release);

        let rearm = self.rearm.regs();
        rearm.read_addr().write_value(REARM_SOURCE.as_ptr() as u32);
        rearm.write_addr().write_value(self.data.regs().al3_read_addr_trig().as_ptr() as u32);
        rearm.trans_count().write_value(1);

        let mut ctrl = CtrlTrig(0);
        ctrl.set_en(true);
        ctrl.set_data_size(DataSize::SIZE_WORD);
        ctrl.set_incr_read(false);
        ctrl.set_incr_write(false);
        ctrl.set_treq_sel(TreqSel::PERMANENT);
        // Chaining to itself disables chaining.
        ctrl.set_chain_to(self.rearm.number());
        ctrl.set_irq_quiet(true);
        rearm.al1_ctrl().write_value(ctrl.0);
        debug!("DMA CH{} re-arms CH{}", self.rearm.number(), self.data.number());
        Ok(())
    }

    unsafe fn configure_data_channel(&mut self, origin: usize, count: u32, pacing_dreq: u8) -> Result<(), RpDmaError> {
        let start = bus_address(origin)?;
        if !in_sram(origin, count as usize) {
            return Err(RpDmaError::NotInSram { origin: start, len: count });
        }
        if pacing_dreq > MAX_DREQ {
            return Err(RpDmaError::Dreq { dreq: pacing_dreq });
        }

        let data = self.data.regs();
        data.read_addr().write_value(start);
        data.write_addr().write_value(self.fifo);
        data.trans_count().write_value(count);

        let mut ctrl = CtrlTrig(0);
        ctrl.set_en(true);
        ctrl.set_data_size(DataSize::SIZE_BYTE);
        ctrl.set_incr_read(true);
        ctrl.set_incr_write(false);
        ctrl.set_treq_sel(TreqSel::from(pacing_dreq));
        ctrl.set_chain_to(self.rearm.number());
        ctrl.set_irq_quiet(true);
        data.al1_ctrl().write_value(ctrl.0);
        debug!("DMA CH{}: {} bytes, DREQ {}", self.data.number(), count, pacing_dreq);
        Ok(())
    }

    unsafe fn trigger(&mut self, origin: usize) -> Result<(), RpDmaError> {
        let start = bus_address(origin)?;
        // Framebuffer writes must land before the first DMA read.
        compiler_fence(Ordering::SeqCst);
        self.data.regs().al3_read_addr_trig().write_value(start);
        Ok(())
    }

    fn abort(&mut self) -> Result<(), RpDmaError> {
        // Re-arm channel first so a finishing data channel cannot restart the loop.
        let rearm = self.rearm.regs();
        let mut ctrl = CtrlTrig(rearm.al1_ctrl().read());
        ctrl.set_en(false);
        rearm.al1_ctrl().write_value(ctrl.0);

        let mask = self.channel_mask();
        pac::DMA.chan_abort().write(|w| w.set_chan_abort(mask));
        let mut spins: u32 = 0;
        while pac::DMA.chan_abort().read().chan_abort() & mask != 0 {
            spins = spins.saturating_add(1);
            if spins > ABORT_SPINS {
                error!("DMA abort stuck, mask {:#x}", mask);
                return Err(RpDmaError::AbortTimeout);
            }
            core::hint::spin_loop();
        }

        ctrl.set_en(true);
        rearm.al1_ctrl().write_value(ctrl.0);
        Ok(())
    }
}
