//! DLPC1438 register map and payload encodings.
//!
//! Reference: TI DLPC1438 Programmer's Guide (DLPU105), sections 3.1.1.1
//! (operating mode), 3.3.2–3.3.12 (external print / FPGA front-end).
//!
//! # Split opcodes
//!
//! Every register has a *write* opcode and a *read* opcode one above it
//! (mode select is written at `0x05` and read at `0x06`). [`Register`] keeps
//! the pair together with the payload length so callers never pair the wrong
//! opcodes.
//!
//! # Byte order
//!
//! Multi-byte numeric fields (frame counts, PWM duty, CRC) are little-endian:
//! least significant byte first.

/// 7-bit control-bus address of the DLPC1438 in the shipped configuration.
pub const DLPC1438_I2C_ADDR: u8 = 0x1B;

/// Maximum control-bus clock the DLPC1438 accepts.
pub const MAX_BUS_FREQUENCY_HZ: u32 = 100_000;

/// A controller register: write opcode, read opcode and payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Register {
    /// Opcode used to write the register (`None` for read-only registers).
    pub write: Option<u8>,
    /// Opcode used to read the register back.
    pub read: u8,
    /// Payload length in bytes.
    pub len: usize,
    /// Short name for logs.
    pub name: &'static str,
}

impl Register {
    // Read opcode is always write + 1 on this controller; every write opcode is odd.
    #[allow(clippy::arithmetic_side_effects)]
    const fn rw(write: u8, len: usize, name: &'static str) -> Self {
        Self { write: Some(write), read: write + 1, len, name }
    }

    const fn ro(read: u8, len: usize, name: &'static str) -> Self {
        Self { write: None, read, len, name }
    }

    /// Opcode used for logs and error reports: the write opcode when there is one.
    pub const fn id(&self) -> u8 {
        match self.write {
            Some(w) => w,
            None => self.read,
        }
    }
}

/// Operating mode select (programmer's guide §3.1.1.1). One byte.
pub const REG_OPERATING_MODE: Register = Register::rw(0x05, 1, "operating mode");
/// Test pattern select: pattern type + four parameters. Five bytes.
pub const REG_TEST_PATTERN: Register = Register::rw(0x0B, 6, "test pattern");
/// Image orientation (long/short axis flips). One byte.
pub const REG_IMAGE_ORIENTATION: Register = Register::rw(0x14, 1, "image orientation");
/// Illumination PWM duty: 10 bits in a 16-bit little-endian field.
pub const REG_ILLUMINATION_PWM: Register = Register::rw(0x54, 2, "illumination pwm");
/// External print configuration: degamma select, illuminator enable.
pub const REG_EXTERNAL_PRINT_CONFIG: Register = Register::rw(0xA8, 2, "external print config");
/// External print layer control: control byte, dark frames, exposed frames.
pub const REG_PRINT_LAYER_CONTROL: Register = Register::rw(0xC1, 5, "print layer control");
/// Parallel video interface control; bit 0 enables the interface (programmer's guide §3.3.10).
pub const REG_VIDEO_INTERFACE: Register = Register::rw(0xC3, 1, "video interface");
/// Active buffer index for the FPGA front-end (programmer's guide §3.3.12).
pub const REG_ACTIVE_BUFFER: Register = Register::rw(0xC5, 1, "active buffer");
/// FPGA control; bit 2 enables CRC16 checking of the image stream.
pub const REG_FPGA_CONTROL: Register = Register::rw(0xCA, 1, "fpga control");
/// CRC16 of the last image stream, little-endian. Read-only.
pub const REG_CRC16: Register = Register::ro(0xCE, 2, "crc16");

/// Every register the driver knows about.
pub const REGISTERS: &[Register] = &[
    REG_OPERATING_MODE,
    REG_TEST_PATTERN,
    REG_IMAGE_ORIENTATION,
    REG_ILLUMINATION_PWM,
    REG_EXTERNAL_PRINT_CONFIG,
    REG_PRINT_LAYER_CONTROL,
    REG_VIDEO_INTERFACE,
    REG_ACTIVE_BUFFER,
    REG_FPGA_CONTROL,
    REG_CRC16,
];

/// Look up the register whose read opcode is `read`.
pub fn register_by_read_opcode(read: u8) -> Option<&'static Register> {
    REGISTERS.iter().find(|r| r.read == read)
}

/// FPGA control bit enabling CRC16 checking.
pub const FPGA_CONTROL_CRC16_ENABLE: u8 = 1 << 2;
/// Video interface control bit enabling the parallel port.
pub const VIDEO_INTERFACE_ENABLE: u8 = 1 << 0;

// ---------------------------------------------------------------------------
// Operating mode
// ---------------------------------------------------------------------------

/// Controller operating mode.
///
/// Mastered by the chip; the host only mirrors the last commanded value.
/// The wire mapping is exhaustive in both directions: every variant has
/// exactly one wire byte and unknown bytes decode to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Light off, mirrors parked. The only state safe to sit in indefinitely.
    Standby,
    /// Internal test pattern generator.
    TestPattern,
    /// Splash image from flash.
    Splashscreen,
    /// External print (3D print) mode fed from the parallel video port.
    ExternalPrint,
}

impl Mode {
    /// Wire value written to [`REG_OPERATING_MODE`].
    pub const fn wire(self) -> u8 {
        match self {
            Self::Standby => 0xFF,
            Self::TestPattern => 0x01,
            Self::Splashscreen => 0x02,
            Self::ExternalPrint => 0x06,
        }
    }

    /// Decode a mode byte read back from the controller.
    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            0xFF => Some(Self::Standby),
            0x01 => Some(Self::TestPattern),
            0x02 => Some(Self::Splashscreen),
            0x06 => Some(Self::ExternalPrint),
            _ => None,
        }
    }

    /// Name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standby => "standby",
            Self::TestPattern => "test pattern",
            Self::Splashscreen => "splashscreen",
            Self::ExternalPrint => "external print",
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Test pattern selection: pattern type byte plus five parameters.
///
/// The register is six bytes wide. Patterns that take fewer parameters leave
/// the trailing bytes at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TestPattern {
    /// Pattern select byte (bit 7 enables the border).
    pub select: u8,
    /// Pattern parameters (foreground/background widths, colours).
    pub params: [u8; 5],
}

impl TestPattern {
    /// Bring-up grid: 240-line pitch in both axes.
    pub const GRID_240: Self = Self::new(0x87, [0, 240, 0, 240, 0]);
    /// Fine line pattern, 8-pixel pitch, used to check focus.
    pub const FINE_LINES: Self = Self::new(0x86, [0, 8, 8, 8, 8]);

    /// Create a pattern from raw register fields.
    pub const fn new(select: u8, params: [u8; 5]) -> Self {
        Self { select, params }
    }

    /// Register payload.
    pub const fn to_bytes(self) -> [u8; 6] {
        let [a, b, c, d, e] = self.params;
        [self.select, a, b, c, d, e]
    }
}

/// Image orientation flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImageOrientation {
    /// Mirror along the long axis.
    pub flip_long_axis: bool,
    /// Mirror along the short axis.
    pub flip_short_axis: bool,
}

impl ImageOrientation {
    /// No flip in either axis.
    pub const NONE: Self = Self { flip_long_axis: false, flip_short_axis: false };

    /// Register byte: bit 1 long axis, bit 2 short axis.
    pub const fn to_byte(self) -> u8 {
        (if self.flip_long_axis { 1 << 1 } else { 0 })
            | (if self.flip_short_axis { 1 << 2 } else { 0 })
    }
}

/// External print configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExternalPrintConfig {
    /// Degamma transfer function select; `0x00` is linear.
    pub degamma: u8,
    /// Illuminator LED enable bits.
    pub illuminator: u8,
}

impl ExternalPrintConfig {
    /// Linear gamma, illuminator select left at the power-on value.
    pub const LINEAR: Self = Self { degamma: 0x00, illuminator: 0x00 };

    /// Register payload.
    pub const fn to_bytes(self) -> [u8; 2] {
        [self.degamma, self.illuminator]
    }
}

/// Error returned when a value does not fit its register field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfRangeError {
    /// The rejected value.
    pub value: u32,
    /// Inclusive maximum.
    pub max: u32,
}

/// Illumination PWM duty, 10 bits (0–1023) in a 16-bit field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct IlluminationPwm(u16);

impl IlluminationPwm {
    /// Largest representable duty.
    pub const MAX: u16 = 0x03FF;
    /// Light engine fully dark.
    pub const OFF: Self = Self(0);
    /// Full duty.
    pub const FULL: Self = Self(Self::MAX);

    /// Create a duty value, clamping anything above 1023.
    pub fn new(duty: u16) -> Self {
        Self(duty.min(Self::MAX))
    }

    /// Create a duty value, rejecting anything above 1023.
    pub fn try_new(duty: u16) -> Result<Self, OutOfRangeError> {
        if duty > Self::MAX {
            Err(OutOfRangeError { value: u32::from(duty), max: u32::from(Self::MAX) })
        } else {
            Ok(Self(duty))
        }
    }

    /// Raw duty.
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Register payload; upper six bits are always zero.
    pub const fn to_bytes(self) -> [u8; 2] {
        (self.0 & Self::MAX).to_le_bytes()
    }
}

/// Number of frames in a print layer command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct FrameCount(u16);

impl FrameCount {
    /// Sentinel: stay lit until an explicit light-off command.
    pub const INDEFINITE: Self = Self(0xFFFF);
    /// No frames.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw count. `0xFFFF` is the indefinite sentinel.
    pub const fn new(frames: u16) -> Self {
        Self(frames)
    }

    /// Raw count.
    pub const fn get(self) -> u16 {
        self.0
    }

    /// True for the indefinite sentinel.
    pub const fn is_indefinite(self) -> bool {
        self.0 == 0xFFFF
    }
}

/// Print layer control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PrintControl {
    /// Expose the layer: dark frames, then lit frames.
    LightOn,
    /// Light off; frame counts are ignored and sent as zero.
    LightOff,
}

impl PrintControl {
    /// Wire value.
    pub const fn wire(self) -> u8 {
        match self {
            Self::LightOn => 0x00,
            Self::LightOff => 0x01,
        }
    }
}

/// External print layer command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PrintLayerCommand {
    /// Light on / light off.
    pub control: PrintControl,
    /// Dark frames shown before the exposure. TI recommends at least 3.
    pub dark_frames: FrameCount,
    /// Lit frames, or [`FrameCount::INDEFINITE`].
    pub exposure_frames: FrameCount,
}

impl PrintLayerCommand {
    /// Light-off command with zeroed frame counts.
    pub const LIGHT_OFF: Self = Self {
        control: PrintControl::LightOff,
        dark_frames: FrameCount::ZERO,
        exposure_frames: FrameCount::ZERO,
    };

    /// Light-on command for `dark` dark frames followed by `exposed` lit frames.
    pub const fn expose(dark: FrameCount, exposed: FrameCount) -> Self {
        Self { control: PrintControl::LightOn, dark_frames: dark, exposure_frames: exposed }
    }

    /// Register payload: control, dark (LE), exposed (LE).
    pub const fn to_bytes(self) -> [u8; 5] {
        let [d0, d1] = self.dark_frames.get().to_le_bytes();
        let [e0, e1] = self.exposure_frames.get().to_le_bytes();
        [self.control.wire(), d0, d1, e0, e1]
    }
}

// ---------------------------------------------------------------------------
// Image CRC
// ---------------------------------------------------------------------------

/// CRC16 the FPGA front-end computes over received image bytes: polynomial
/// 0x8005, initial value 0xFFFF, no reflection, no final XOR.
///
/// Compare with the value read back from [`REG_CRC16`].
#[allow(clippy::arithmetic_side_effects)] // u16 shifts by < 16 bits
pub fn image_crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF_u16, |mut crc, &byte| {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x8005 } else { crc << 1 };
        }
        crc
    })
}
