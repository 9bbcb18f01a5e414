//! DLP Pico Firmware - Main Entry Point
//!
//! Hardware-only entry point for the RP2040.

#![no_std]
#![no_main]

use core::convert::Infallible;

use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pin as _, Pull};
use embassy_rp::i2c::{self, I2c};
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::{InterruptHandler, Pio};
use embassy_time::{Delay, Duration, Timer};
use static_cell::ConstStaticCell;

use firmware::hardware::{PioTimingGenerators, RpDmaChain, StartupError, VideoPins};
use firmware::patterns::{self, MandelbrotView};
use firmware::{bring_up, ExposureOrchestrator, Layer, PrintSettings, FRAMEBUFFER_SIZE_BYTES};
use platform::config;
use platform::{BoardConfig, DlpcController, FrameCount, Framebuffer, IlluminationPwm, PinRole, TransferEngine};

// Log transport and panic handler
use defmt_rtt as _;
use panic_probe as _;

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
});

/// Scan-out buffer in striped SRAM. Taken once, streamed until reset.
static FRAMEBUFFER: ConstStaticCell<[u8; FRAMEBUFFER_SIZE_BYTES]> =
    ConstStaticCell::new([0; FRAMEBUFFER_SIZE_BYTES]);

/// How long the focus lines stay up before the first layer.
const FOCUS_HOLD: Duration = Duration::from_secs(3);

/// Demo layer: LED duty and lit frames.
const DEMO_PWM: u16 = 600;
const DEMO_FRAMES: u16 = 30;

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    defmt::info!("{=str} firmware v{=str}", config::APP_NAME, config::APP_VERSION);
    defmt::info!("Initializing RP2040: PIO0 video timing, DMA CH0/CH1, I2C1 control");

    let p = embassy_rp::init(Default::default());
    let board = BoardConfig::dlp_pico();

    match run(p, &board).await {
        Ok(never) => match never {},
        Err(e) => defmt::error!("halted: {}", defmt::Display2Format(&e)),
    }
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}

async fn run(p: embassy_rp::Peripherals, board: &BoardConfig) -> Result<Infallible, StartupError> {
    let pins = &board.pins;

    // -----------------------------------------------------------------------
    // Control path
    //
    //   GPIO 6  = I2C1 SDA
    //   GPIO 7  = I2C1 SCL
    //   GPIO 22 = PROJ_ON   (push-pull, starts low)
    //   GPIO 21 = HOST_IRQ  (input, driven by the DLPC1438)
    // -----------------------------------------------------------------------
    pins.check(PinRole::Sda, p.PIN_6.pin())?;
    pins.check(PinRole::Scl, p.PIN_7.pin())?;
    pins.check(PinRole::PowerEnable, p.PIN_22.pin())?;
    pins.check(PinRole::Ready, p.PIN_21.pin())?;

    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = board.bus_frequency.get();
    let i2c = I2c::new_blocking(p.I2C1, p.PIN_7, p.PIN_6, i2c_config);
    defmt::info!("I2C1 @ {=u32} Hz", board.bus_frequency.get());

    let power = Output::new(p.PIN_22, Level::Low);
    let ready = Input::new(p.PIN_21, Pull::None);
    let mut controller = DlpcController::new(i2c, power, ready, Delay, board.controller);

    // -----------------------------------------------------------------------
    // Video path: PIO0 SM0..SM3 on GPIO 8..=19, DMA CH0 (data) + CH1 (re-arm)
    // -----------------------------------------------------------------------
    let mut pio = Pio::new(p.PIO0, Irqs);
    let common = &mut pio.common;
    let video_pins = VideoPins {
        hsync: common.make_pio_pin(p.PIN_19),
        vsync: common.make_pio_pin(p.PIN_17),
        data_enable: common.make_pio_pin(p.PIN_18),
        pclk: common.make_pio_pin(p.PIN_16),
        data: [
            common.make_pio_pin(p.PIN_8),
            common.make_pio_pin(p.PIN_9),
            common.make_pio_pin(p.PIN_10),
            common.make_pio_pin(p.PIN_11),
            common.make_pio_pin(p.PIN_12),
            common.make_pio_pin(p.PIN_13),
            common.make_pio_pin(p.PIN_14),
            common.make_pio_pin(p.PIN_15),
        ],
    };
    let mut generators = PioTimingGenerators::new(pio, video_pins, pins)?;
    let chain = RpDmaChain::new(p.DMA_CH0, p.DMA_CH1, generators.pixel_fifo_address());
    let mut engine = TransferEngine::new(chain);

    let buffer: &'static mut [u8] = FRAMEBUFFER.take();
    let mut framebuffer = Framebuffer::new(buffer, board.width, board.height, board.pixel_format)?;

    // SAFETY: the framebuffer borrows a `'static` buffer that is never freed or
    // moved; the engine streams from it until reset.
    let boot = unsafe { bring_up(board, &mut framebuffer, &mut generators, &mut engine, &mut controller) }?;
    defmt::info!("Bring-up complete: {=u32} bytes per frame", boot.transfer_count);

    patterns::show_test_lines(&mut controller)?;
    defmt::info!("Focus lines shown");
    Timer::after(FOCUS_HOLD).await;

    let mut printer = ExposureOrchestrator::new(controller, engine, framebuffer, PrintSettings::from_board(board));
    let layer = Layer::new(IlluminationPwm::new(DEMO_PWM), FrameCount::new(DEMO_FRAMES));

    loop {
        let report = printer.run_layer(&layer, |fb| {
            patterns::checkerboard(fb).unwrap_or_else(|never| match never {});
            Ok(())
        });
        let report = report.and_then(|_| {
            printer.run_layer(&layer, |fb| {
                patterns::mandelbrot(fb, &MandelbrotView::CLASSIC).unwrap_or_else(|never| match never {});
                Ok(())
            })
        });
        match report {
            Ok(r) => defmt::info!("Layer {=u32} held {=u32} ms", r.index, r.hold_ms),
            Err(e) => {
                if let Err(s) = printer.shutdown() {
                    defmt::error!("shutdown failed: {}", defmt::Display2Format(&s));
                }
                return Err(e.into());
            }
        }
    }
}
