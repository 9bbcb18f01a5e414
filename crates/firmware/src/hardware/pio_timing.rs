//! Timing generators on PIO0.
//!
//! Each generator is a small program that pulls its active count once, then
//! loops on it forever. Lines are paced by HSYNC: SM0 raises IRQ 0 at the end
//! of every line, SM1 turns each active line into IRQ 1 (pixel data) and
//! IRQ 2 (pixel clock), and counts the lines up to the vertical sync pulse.
//! All four programs fit the 32-slot instruction memory together.

use embassy_rp::pac;
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::{
    Common, Config, Direction, FifoJoin, Pin, Pio, ShiftConfig, ShiftDirection, StateMachine,
};
use platform::video_timing::ALL_GENERATORS;
use platform::{Generator, PinError, PinRole, Pins, TimingGenerators};
use thiserror_no_std::Error;

/// State machine running the pixel-data program; its TX FIFO is the DMA target.
pub const PIXEL_SM: usize = 2;

/// Errors from the PIO binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PioTimingError {
    /// Instruction memory could not hold a program.
    #[error("PIO0 instruction memory full loading {}", .program)]
    ProgramSpace { program: &'static str },
    /// A pin does not match the board wiring.
    #[error("{0}")]
    Pin(#[from] PinError),
    /// Count pushed while the state machine still held the previous one.
    #[error("{} TX FIFO full", .generator.as_str())]
    FifoFull { generator: Generator },
    /// Enable mask names a generator that does not exist.
    #[error("enable mask {:#x} outside {:#x}", .mask, ALL_GENERATORS)]
    InvalidMask { mask: u8 },
}

/// GPIOs handed to PIO0, already converted with `Common::make_pio_pin`.
pub struct VideoPins<'d> {
    /// HSYNC output.
    pub hsync: Pin<'d, PIO0>,
    /// VSYNC output.
    pub vsync: Pin<'d, PIO0>,
    /// DATAEN_CMD output, side-set by the pixel program.
    pub data_enable: Pin<'d, PIO0>,
    /// PCLK output.
    pub pclk: Pin<'d, PIO0>,
    /// Parallel data bus, bit 0 first. Must be eight consecutive GPIOs.
    pub data: [Pin<'d, PIO0>; 8],
}

impl VideoPins<'_> {
    /// Verify every pin against the board wiring.
    pub fn check(&self, pins: &Pins) -> Result<(), PinError> {
        pins.check(PinRole::HSync, self.hsync.pin())?;
        pins.check(PinRole::VSync, self.vsync.pin())?;
        pins.check(PinRole::DataEnable, self.data_enable.pin())?;
        pins.check(PinRole::PixelClock, self.pclk.pin())?;
        for (bit, pin) in (0u8..).zip(self.data.iter()) {
            pins.check(PinRole::PixelData(bit), pin.pin())?;
        }
        Ok(())
    }
}

/// The four HD720 timing generators on PIO0 state machines 0..=3.
pub struct PioTimingGenerators<'d> {
    common: Common<'d, PIO0>,
    hsync: StateMachine<'d, PIO0, 0>,
    vsync: StateMachine<'d, PIO0, 1>,
    pixel: StateMachine<'d, PIO0, 2>,
    pclk: StateMachine<'d, PIO0, 3>,
    _pins: VideoPins<'d>,
}

impl<'d> PioTimingGenerators<'d> {
    /// Load the programs and configure every state machine. Nothing runs yet.
    pub fn new(pio: Pio<'d, PIO0>, pins: VideoPins<'d>, board: &Pins) -> Result<Self, PioTimingError> {
        pins.check(board)?;
        let Pio { mut common, mut sm0, mut sm1, mut sm2, mut sm3, .. } = pio;

        // Line: active count, then a 64-cycle sync pulse, then IRQ 0.
        let hsync_program = pio::pio_asm!(
            "    pull block",
            ".wrap_target",
            "    mov x, osr",
            "active:",
            "    jmp x-- active",
            "    set pins, 0 [31]",
            "    set pins, 1 [31]",
            "    irq 0 [1]",
            ".wrap",
        );
        // Frame: one IRQ 1 + IRQ 2 per active line, then a two-line sync pulse.
        let vsync_program = pio::pio_asm!(
            "    pull block",
            ".wrap_target",
            "    mov x, osr",
            "    jmp x-- active",
            "active:",
            "    wait 1 irq 0",
            "    irq 1",
            "    irq 2",
            "    jmp x-- active",
            "    set pins, 0",
            "    wait 1 irq 0",
            "    wait 1 irq 0",
            "    set pins, 1",
            ".wrap",
        );
        // Per active line: count bytes out of the FIFO with DATAEN held high.
        let pixel_program = pio::pio_asm!(
            ".side_set 1 opt",
            "    pull block",
            "    out y, 32",
            ".wrap_target",
            "    mov x, y        side 0",
            "    wait 1 irq 1",
            "    jmp x-- byte",
            "byte:",
            "    out pins, 8     side 1 [1]",
            "    jmp x-- byte",
            ".wrap",
        );
        // Per active line: one clock pulse for every byte the pixel program shifts.
        let pclk_program = pio::pio_asm!(
            "    pull block",
            "    mov y, osr",
            ".wrap_target",
            "    mov x, y",
            "    wait 1 irq 2",
            "    jmp x-- tick",
            "tick:",
            "    set pins, 1",
            "    set pins, 0",
            "    jmp x-- tick",
            ".wrap",
        );

        let hsync_loaded = common
            .try_load_program(&hsync_program.program)
            .map_err(|_| PioTimingError::ProgramSpace { program: "hsync" })?;
        let vsync_loaded = common
            .try_load_program(&vsync_program.program)
            .map_err(|_| PioTimingError::ProgramSpace { program: "vsync" })?;
        let pixel_loaded = common
            .try_load_program(&pixel_program.program)
            .map_err(|_| PioTimingError::ProgramSpace { program: "pixel" })?;
        let pclk_loaded = common
            .try_load_program(&pclk_program.program)
            .map_err(|_| PioTimingError::ProgramSpace { program: "pclk" })?;

        let mut cfg = Config::default();
        cfg.use_program(&hsync_loaded, &[]);
        cfg.set_set_pins(&[&pins.hsync]);
        sm0.set_config(&cfg);
        sm0.set_pin_dirs(Direction::Out, &[&pins.hsync]);

        let mut cfg = Config::default();
        cfg.use_program(&vsync_loaded, &[]);
        cfg.set_set_pins(&[&pins.vsync]);
        sm1.set_config(&cfg);
        sm1.set_pin_dirs(Direction::Out, &[&pins.vsync]);

        let data: [&Pin<'d, PIO0>; 8] = [
            &pins.data[0],
            &pins.data[1],
            &pins.data[2],
            &pins.data[3],
            &pins.data[4],
            &pins.data[5],
            &pins.data[6],
            &pins.data[7],
        ];
        let mut cfg = Config::default();
        cfg.use_program(&pixel_loaded, &[&pins.data_enable]);
        cfg.set_out_pins(&data);
        cfg.fifo_join = FifoJoin::TxOnly;
        cfg.shift_out = ShiftConfig { auto_fill: true, threshold: 8, direction: ShiftDirection::Right };
        sm2.set_config(&cfg);
        sm2.set_pin_dirs(Direction::Out, &data);
        sm2.set_pin_dirs(Direction::Out, &[&pins.data_enable]);

        let mut cfg = Config::default();
        cfg.use_program(&pclk_loaded, &[]);
        cfg.set_set_pins(&[&pins.pclk]);
        sm3.set_config(&cfg);
        sm3.set_pin_dirs(Direction::Out, &[&pins.pclk]);

        info!("PIO0 programs loaded");
        Ok(Self { common, hsync: sm0, vsync: sm1, pixel: sm2, pclk: sm3, _pins: pins })
    }

    /// Bus address of the pixel state machine's TX FIFO.
    pub fn pixel_fifo_address(&self) -> u32 {
        pac::PIO0.txf(PIXEL_SM).as_ptr() as u32
    }
}

impl TimingGenerators for PioTimingGenerators<'_> {
    type Error = PioTimingError;

    fn load_active_count(&mut self, generator: Generator, count: u32) -> Result<(), PioTimingError> {
        let pushed = match generator {
            Generator::HSync => self.hsync.tx().try_push(count),
            Generator::VSync => self.vsync.tx().try_push(count),
            Generator::DataEnable => self.pixel.tx().try_push(count),
            Generator::PixelClock => self.pclk.tx().try_push(count),
        };
        if pushed {
            Ok(())
        } else {
            Err(PioTimingError::FifoFull { generator })
        }
    }

    fn enable_in_sync(&mut self, mask: u8) -> Result<(), PioTimingError> {
        if mask & !ALL_GENERATORS != 0 {
            return Err(PioTimingError::InvalidMask { mask });
        }
        let Self { common, hsync, vsync, pixel, pclk, .. } = self;
        common.apply_sm_batch(|batch| {
            if mask & Generator::HSync.mask_bit() != 0 {
                batch.set_enable(hsync, true);
            }
            if mask & Generator::VSync.mask_bit() != 0 {
                batch.set_enable(vsync, true);
            }
            if mask & Generator::DataEnable.mask_bit() != 0 {
                batch.set_enable(pixel, true);
            }
            if mask & Generator::PixelClock.mask_bit() != 0 {
                batch.set_enable(pclk, true);
            }
        });
        Ok(())
    }

    fn disable_all(&mut self) -> Result<(), PioTimingError> {
        self.hsync.set_enable(false);
        self.vsync.set_enable(false);
        self.pixel.set_enable(false);
        self.pclk.set_enable(false);
        Ok(())
    }
}
