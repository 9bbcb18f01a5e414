//! Parallel-video timing parameters and the timing-generator seam.
//!
//! Four free-running generators drive the DLPC1438 parallel port: HSYNC,
//! VSYNC, DATAEN_CMD and PCLK. Each takes one "active count" at start-up and
//! then runs unattended. The pixel-data generator's intake FIFO is fed by the
//! transfer engine.
//!
//! Phase between the generators is fixed at the moment they start, so they
//! must be enabled in one masked write. Starting them one by one leaves them
//! out of phase and the controller never locks.

/// One of the four timing generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Generator {
    /// Horizontal sync.
    HSync,
    /// Vertical sync.
    VSync,
    /// Data-enable / command strobe.
    DataEnable,
    /// Pixel clock and data shifter.
    PixelClock,
}

impl Generator {
    /// All generators, in load order.
    pub const ALL: [Self; 4] = [Self::HSync, Self::VSync, Self::DataEnable, Self::PixelClock];

    /// Bit of this generator in an enable mask.
    pub const fn mask_bit(self) -> u8 {
        match self {
            Self::HSync => 1 << 0,
            Self::VSync => 1 << 1,
            Self::DataEnable => 1 << 2,
            Self::PixelClock => 1 << 3,
        }
    }

    /// Name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HSync => "hsync",
            Self::VSync => "vsync",
            Self::DataEnable => "dataen",
            Self::PixelClock => "pclk",
        }
    }
}

/// Enable mask covering every generator.
pub const ALL_GENERATORS: u8 = 0x0F;

/// Active counts for one video mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VideoTiming {
    /// Horizontal count (active pixels plus blanking).
    pub h_active: u32,
    /// Vertical count (active lines).
    pub v_active: u32,
    /// Data-enable count per line.
    pub data_enable_active: u32,
    /// Pixel-clock count per line.
    pub pixel_clock_active: u32,
}

impl VideoTiming {
    /// 1280×720 on the 2 bpp parallel port.
    pub const HD720: Self =
        Self { h_active: 1300, v_active: 720, data_enable_active: 320, pixel_clock_active: 320 };

    /// Active count for `generator`.
    pub const fn count(&self, generator: Generator) -> u32 {
        match generator {
            Generator::HSync => self.h_active,
            Generator::VSync => self.v_active,
            Generator::DataEnable => self.data_enable_active,
            Generator::PixelClock => self.pixel_clock_active,
        }
    }
}

impl Default for VideoTiming {
    fn default() -> Self {
        Self::HD720
    }
}

/// Hardware binding for the four generators (PIO state machines on RP2040).
pub trait TimingGenerators {
    /// Binding-specific failure.
    type Error;

    /// Push the active count into `generator`'s input queue. Generator stays stopped.
    fn load_active_count(&mut self, generator: Generator, count: u32) -> Result<(), Self::Error>;

    /// Start every generator in `mask` on the same clock edge.
    fn enable_in_sync(&mut self, mask: u8) -> Result<(), Self::Error>;

    /// Stop all generators.
    fn disable_all(&mut self) -> Result<(), Self::Error>;
}

/// Load every active count, then start all generators in one masked enable.
pub fn start_video<T: TimingGenerators>(gens: &mut T, timing: &VideoTiming) -> Result<(), T::Error> {
    for g in Generator::ALL {
        gens.load_active_count(g, timing.count(g))?;
        debug!("{} active count {}", g.as_str(), timing.count(g));
    }
    gens.enable_in_sync(ALL_GENERATORS)?;
    info!("video timing started: {}x{}", timing.h_active, timing.v_active);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::mocks::{GeneratorEvent, SimulatedTimingGenerators};

    #[test]
    fn mask_bits_cover_all_generators() {
        let mask = Generator::ALL.iter().fold(0, |m, g| m | g.mask_bit());
        assert_eq!(mask, ALL_GENERATORS);
    }

    #[test]
    fn start_video_loads_counts_before_one_atomic_enable() {
        let mut gens = SimulatedTimingGenerators::new();
        start_video(&mut gens, &VideoTiming::HD720).unwrap();
        assert_eq!(
            gens.events(),
            [
                GeneratorEvent::Load(Generator::HSync, 1300),
                GeneratorEvent::Load(Generator::VSync, 720),
                GeneratorEvent::Load(Generator::DataEnable, 320),
                GeneratorEvent::Load(Generator::PixelClock, 320),
                GeneratorEvent::Enable(ALL_GENERATORS),
            ]
        );
        assert!(gens.in_phase());
    }
}
