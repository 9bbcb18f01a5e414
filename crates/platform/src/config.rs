//! Application identity and board configuration.
//!
//! Everything the firmware used to keep as process-wide constants (bus
//! address, pin numbers, timing, policies) lives in [`BoardConfig`], built
//! once at start-up and passed by reference to whatever needs it.

use crate::control_bus::ReadQuirk;
use crate::controller::{ControllerConfig, NackPolicy, SettleDelays, VerifyPolicy};
use crate::dlpc1438::{OutOfRangeError, DLPC1438_I2C_ADDR, MAX_BUS_FREQUENCY_HZ};
use crate::dma_safety::{FRAME_HEIGHT, FRAME_WIDTH};
use crate::framebuffer::PixelFormat;
use crate::handshake::ReadyPolicy;
use crate::video_timing::VideoTiming;
use thiserror_no_std::Error;

/// The application name
pub const APP_NAME: &str = "DLP Pico";

/// What the application drives
pub const APP_TYPE: &str = "DLPC1438 light engine";

/// Application version (synchronized with Cargo.toml)
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Development mode banner
pub const fn dev_banner() -> &'static str {
    "DLP Pico - Emulator"
}

/// Control-bus clock, at most [`MAX_BUS_FREQUENCY_HZ`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct BusFrequencyHz(u32);

impl BusFrequencyHz {
    /// 38 kHz: comfortably inside the controller's limit on long flying leads.
    pub const DEFAULT: Self = Self(38_000);

    /// Clamp to the controller maximum.
    pub fn new(hz: u32) -> Self {
        Self(hz.min(MAX_BUS_FREQUENCY_HZ))
    }

    /// Reject anything above the controller maximum or zero.
    pub fn try_new(hz: u32) -> Result<Self, OutOfRangeError> {
        if hz == 0 || hz > MAX_BUS_FREQUENCY_HZ {
            Err(OutOfRangeError { value: hz, max: MAX_BUS_FREQUENCY_HZ })
        } else {
            Ok(Self(hz))
        }
    }

    /// Raw frequency.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Default for BusFrequencyHz {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// GPIO assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pins {
    /// Horizontal sync.
    pub hsync: u8,
    /// Data-enable / command strobe.
    pub data_enable: u8,
    /// Vertical sync.
    pub vsync: u8,
    /// Pixel clock.
    pub pclk: u8,
    /// First of eight contiguous pixel data pins.
    pub pixel_data_base: u8,
    /// Control-bus data.
    pub sda: u8,
    /// Control-bus clock.
    pub scl: u8,
    /// Controller power-enable (PROJ_ON).
    pub power_enable: u8,
    /// Controller ready (HOST_IRQ), 1.8 V.
    pub ready: u8,
}

impl Pins {
    /// Wiring of the shipped board.
    pub const DLP_PICO: Self = Self {
        hsync: 19,
        data_enable: 18,
        vsync: 17,
        pclk: 16,
        pixel_data_base: 8,
        sda: 6,
        scl: 7,
        power_enable: 22,
        ready: 21,
    };
}

/// What a GPIO does on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinRole {
    /// Horizontal sync.
    HSync,
    /// Data-enable / command strobe.
    DataEnable,
    /// Vertical sync.
    VSync,
    /// Pixel clock.
    PixelClock,
    /// Pixel data bit `n` (0..=7).
    PixelData(u8),
    /// Control-bus data.
    Sda,
    /// Control-bus clock.
    Scl,
    /// PROJ_ON.
    PowerEnable,
    /// HOST_IRQ.
    Ready,
}

impl PinRole {
    /// Name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HSync => "hsync",
            Self::DataEnable => "dataen_cmd",
            Self::VSync => "vsync",
            Self::PixelClock => "pclk",
            Self::PixelData(_) => "pdata",
            Self::Sda => "sda",
            Self::Scl => "scl",
            Self::PowerEnable => "proj_on",
            Self::Ready => "host_irq",
        }
    }
}

/// A peripheral was handed a different GPIO than the board assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinError {
    /// Claimed GPIO differs from the assignment.
    #[error("{} on GPIO {}, board assigns GPIO {}", .role.as_str(), .claimed, .expected)]
    Mismatch {
        /// Pin function.
        role: PinRole,
        /// GPIO from [`Pins`].
        expected: u8,
        /// GPIO actually claimed.
        claimed: u8,
    },
    /// Role has no GPIO (pixel data bit past 7, or past GPIO 255).
    #[error("{} has no GPIO assignment", .role.as_str())]
    Unassigned {
        /// Pin function.
        role: PinRole,
    },
}

impl Pins {
    /// GPIO assigned to `role`.
    pub fn gpio(&self, role: PinRole) -> Option<u8> {
        match role {
            PinRole::HSync => Some(self.hsync),
            PinRole::DataEnable => Some(self.data_enable),
            PinRole::VSync => Some(self.vsync),
            PinRole::PixelClock => Some(self.pclk),
            PinRole::PixelData(bit) if bit < 8 => self.pixel_data_base.checked_add(bit),
            PinRole::PixelData(_) => None,
            PinRole::Sda => Some(self.sda),
            PinRole::Scl => Some(self.scl),
            PinRole::PowerEnable => Some(self.power_enable),
            PinRole::Ready => Some(self.ready),
        }
    }

    /// Check that the GPIO a driver claimed for `role` is the assigned one.
    pub fn check(&self, role: PinRole, claimed: u8) -> Result<(), PinError> {
        let expected = self.gpio(role).ok_or(PinError::Unassigned { role })?;
        if expected == claimed {
            Ok(())
        } else {
            error!("{} claimed on GPIO {}, board assigns GPIO {}", role.as_str(), claimed, expected);
            Err(PinError::Mismatch { role, expected, claimed })
        }
    }
}

/// Frame timing used to turn frame counts into wall-clock holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExposureTiming {
    /// Controller frame period in microseconds.
    pub frame_period_us: u32,
}

impl ExposureTiming {
    /// 60 Hz.
    pub const HZ_60: Self = Self { frame_period_us: 16_667 };
}

/// Board context handed to every component at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoardConfig {
    /// Control-bus clock.
    pub bus_frequency: BusFrequencyHz,
    /// GPIO assignment.
    pub pins: Pins,
    /// Control-path settings (address, quirk, policies, delays).
    pub controller: ControllerConfig,
    /// Scan-out width in pixels.
    pub width: u32,
    /// Scan-out height in lines.
    pub height: u32,
    /// Scan-out pixel format.
    pub pixel_format: PixelFormat,
    /// Timing-generator active counts.
    pub video: VideoTiming,
    /// DREQ pacing the data channel (pixel generator TX FIFO).
    pub pixel_dreq: u8,
    /// Frame period for exposure holds.
    pub exposure: ExposureTiming,
}

impl BoardConfig {
    /// The shipped configuration: 1280×720, 2 bpp MSB-first, DLPC1438 at 0x1B.
    pub const fn dlp_pico() -> Self {
        Self {
            bus_frequency: BusFrequencyHz::DEFAULT,
            pins: Pins::DLP_PICO,
            controller: ControllerConfig {
                address: DLPC1438_I2C_ADDR,
                read_quirk: ReadQuirk::None,
                ready: ReadyPolicy::EDGE_WAIT,
                settle: SettleDelays::DLP_PICO,
                verify: VerifyPolicy::ReadBack,
                nack: NackPolicy::Continue,
            },
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            pixel_format: PixelFormat::GRAY2_MSB,
            video: VideoTiming::HD720,
            // DREQ_PIO0_TX2: the pixel generator runs on PIO0 state machine 2.
            pixel_dreq: 2,
            exposure: ExposureTiming::HZ_60,
        }
    }

    /// Bytes per frame: the transfer engine's count per cycle.
    pub const fn framebuffer_len(&self) -> usize {
        self.pixel_format.buffer_len(self.width, self.height)
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self::dlp_pico()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::dma_safety::FRAMEBUFFER_SIZE_BYTES;

    #[test]
    fn shipped_board_constants() {
        let cfg = BoardConfig::dlp_pico();
        assert_eq!(cfg.controller.address, 0x1B);
        assert_eq!(cfg.bus_frequency.get(), 38_000);
        assert_eq!(cfg.framebuffer_len(), FRAMEBUFFER_SIZE_BYTES);
        assert_eq!(cfg.video.h_active, 1300);
        assert_eq!(cfg.pins.hsync, 19);
        assert_eq!(cfg.pins.pixel_data_base, 8);
    }

    #[test]
    fn bus_frequency_is_capped_at_controller_max() {
        assert_eq!(BusFrequencyHz::new(400_000).get(), 100_000);
        assert_eq!(
            BusFrequencyHz::try_new(400_000),
            Err(OutOfRangeError { value: 400_000, max: 100_000 })
        );
        assert!(BusFrequencyHz::try_new(0).is_err());
        assert_eq!(BusFrequencyHz::try_new(50_000).map(BusFrequencyHz::get), Ok(50_000));
    }

    #[test]
    fn pin_roles_resolve_to_the_board_wiring() {
        let p = Pins::DLP_PICO;
        assert_eq!(p.gpio(PinRole::PixelData(0)), Some(8));
        assert_eq!(p.gpio(PinRole::PixelData(7)), Some(15));
        assert_eq!(p.gpio(PinRole::PixelData(8)), None);
        assert_eq!(p.check(PinRole::Sda, 6), Ok(()));
        assert_eq!(p.check(PinRole::PowerEnable, 22), Ok(()));
        assert_eq!(
            p.check(PinRole::Ready, 20),
            Err(PinError::Mismatch { role: PinRole::Ready, expected: 21, claimed: 20 })
        );
        assert_eq!(p.check(PinRole::PixelData(9), 17), Err(PinError::Unassigned { role: PinRole::PixelData(9) }));
    }

    #[test]
    fn pins_do_not_collide() {
        let p = Pins::DLP_PICO;
        let mut used = std::vec![p.hsync, p.data_enable, p.vsync, p.pclk, p.sda, p.scl, p.power_enable, p.ready];
        used.extend(p.pixel_data_base..p.pixel_data_base + 8);
        let n = used.len();
        used.sort_unstable();
        used.dedup();
        assert_eq!(used.len(), n);
    }
}
