//! DLP Pico Exposure Emulator
//!
//! Runs the full bring-up and a short exposure job against the simulated
//! DLPC1438, DMA chain and timing generators, then prints a coarse preview
//! of each layer.
//!
//! Run with: RUST_LOG=info cargo run --example exposure_emulator --features emulator
//! Add `-- --fast` to skip the real settle and hold delays.

#![allow(clippy::print_stdout, clippy::arithmetic_side_effects)]

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use firmware::patterns::{self, MandelbrotView};
use firmware::{bring_up, ExposureOrchestrator, Layer, PrintSettings};
use platform::config;
use platform::mocks::{ScriptedPin, SimulatedDlpc, SimulatedDmaChain, SimulatedTimingGenerators};
use platform::{BoardConfig, DlpcController, FrameCount, Framebuffer, IlluminationPwm, ReadyPolicy, TransferEngine};
use tracing_subscriber::EnvFilter;

/// Preview cell size in pixels.
const PREVIEW_CELL: (u32, u32) = (40, 40);

/// `DelayNs` backed by `thread::sleep`, or a no-op in fast mode.
struct StdDelay {
    fast: bool,
}

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        if !self.fast {
            thread::sleep(Duration::from_nanos(u64::from(ns)));
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        if !self.fast {
            thread::sleep(Duration::from_millis(u64::from(ms)));
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let fast = std::env::args().any(|a| a == "--fast");
    match run(fast) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(fast: bool) -> Result<(), String> {
    println!("{} - Exposure Emulator", config::APP_NAME);
    println!("{} v{}\n", config::APP_TYPE, config::APP_VERSION);

    let mut board = BoardConfig::dlp_pico();
    // The simulated ready line never pulses.
    board.controller.ready = ReadyPolicy::fixed(1000);

    let mut framebuffer = Framebuffer::new(
        vec![0u8; board.framebuffer_len()],
        board.width,
        board.height,
        board.pixel_format,
    )
    .map_err(|e| e.to_string())?;
    let mut generators = SimulatedTimingGenerators::new();
    let mut engine = TransferEngine::new(SimulatedDmaChain::new());
    let sim = SimulatedDlpc::new();
    let mut controller = DlpcController::new(
        sim.clone(),
        ScriptedPin::new(&[]),
        ScriptedPin::new(&[false]),
        StdDelay { fast },
        board.controller,
    );

    // SAFETY: the framebuffer's Vec storage never moves; it is handed to the
    // orchestrator together with the engine below.
    let boot = unsafe { bring_up(&board, &mut framebuffer, &mut generators, &mut engine, &mut controller) }
        .map_err(|e| e.to_string())?;
    println!(
        "Bring-up: {} bytes per frame, generators in phase: {}",
        boot.transfer_count,
        generators.in_phase()
    );

    patterns::show_test_lines(&mut controller).map_err(|e| e.to_string())?;
    println!("Focus pattern shown (controller mode {})\n", sim.mode().map_or("unknown", |m| m.as_str()));

    let mut printer = ExposureOrchestrator::new(controller, engine, framebuffer, PrintSettings::from_board(&board));
    let layer = Layer::new(IlluminationPwm::new(600), FrameCount::new(30));

    let report = printer
        .run_layer(&layer, |fb| {
            patterns::checkerboard(fb).unwrap_or_else(|never| match never {});
            Ok(())
        })
        .map_err(|e| e.to_string())?;
    println!("Layer {}: checkerboard, held {} ms", report.index, report.hold_ms);
    preview(printer.framebuffer());

    let mut iterations = 0;
    let report = printer
        .run_layer(&layer, |fb| {
            iterations = patterns::mandelbrot(fb, &MandelbrotView::CLASSIC).unwrap_or_else(|never| match never {});
            Ok(())
        })
        .map_err(|e| e.to_string())?;
    println!("Layer {}: mandelbrot ({} iterations), held {} ms", report.index, iterations, report.hold_ms);
    preview(printer.framebuffer());

    printer.shutdown().map_err(|e| e.to_string())?;
    println!(
        "Done: {} layers, {} register writes, {} read-back mismatches",
        printer.layers_done(),
        sim.writes().len(),
        printer.controller().readback_mismatches()
    );
    Ok(())
}

/// Print one character per cell, darkest to brightest.
fn preview(fb: &Framebuffer<Vec<u8>>) {
    const RAMP: [char; 4] = [' ', '.', '+', '#'];
    let (cw, ch) = PREVIEW_CELL;
    for cy in (0..fb.height()).step_by(ch as usize) {
        let row: String = (0..fb.width())
            .step_by(cw as usize)
            .map(|cx| {
                let level = fb.pixel(cx + cw / 2, cy + ch / 2).unwrap_or(0);
                RAMP.get(usize::from(level)).copied().unwrap_or('#')
            })
            .collect();
        println!("|{row}|");
    }
    println!();
}
