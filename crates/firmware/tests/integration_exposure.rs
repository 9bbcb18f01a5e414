//! Exposure orchestrator integration tests
//!
//! Brings a simulated board up through `firmware::bring_up`, then drives
//! layers through the orchestrator and checks the controller traffic, the
//! light state and what the DMA loop scans out.
//!
//! Run with: cargo test -p firmware --test integration_exposure

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
#![allow(clippy::arithmetic_side_effects)]

use firmware::{bring_up, ExposureError, ExposureOrchestrator, Layer, PrintSettings};
use platform::mocks::{ChainEvent, RecordingDelay, ScriptedPin, SimulatedDlpc, SimulatedDmaChain, SimulatedTimingGenerators};
use platform::{
    BoardConfig, ControlError, DeviceState, DlpcController, EngineState, FrameCount, Framebuffer,
    FramebufferError, IlluminationPwm, Mode, NackPolicy, ReadyPolicy, TransferEngine,
};

type Rig = ExposureOrchestrator<SimulatedDlpc, ScriptedPin, ScriptedPin, RecordingDelay, SimulatedDmaChain, Vec<u8>>;

const OP_MODE: u8 = 0x05;
const OP_TEST_PATTERN: u8 = 0x0B;
const OP_ORIENTATION: u8 = 0x14;
const OP_PWM: u8 = 0x54;
const OP_PRINT_CONFIG: u8 = 0xA8;
const OP_LAYER: u8 = 0xC1;

fn board() -> BoardConfig {
    let mut cfg = BoardConfig::dlp_pico();
    cfg.width = 32;
    cfg.height = 8;
    cfg.controller.ready = ReadyPolicy::fixed(1000);
    cfg
}

fn rig_with(cfg: &BoardConfig) -> (Rig, SimulatedDlpc) {
    let sim = SimulatedDlpc::new();
    let mut fb =
        Framebuffer::new(vec![0u8; cfg.framebuffer_len()], cfg.width, cfg.height, cfg.pixel_format).unwrap();
    let mut gens = SimulatedTimingGenerators::new();
    let mut engine = TransferEngine::new(SimulatedDmaChain::new());
    let mut ctrl = DlpcController::new(
        sim.clone(),
        ScriptedPin::new(&[]),
        ScriptedPin::new(&[false]),
        RecordingDelay::new(),
        cfg.controller,
    );
    // SAFETY: `fb` moves into the orchestrator with `engine`; its Vec storage stays put.
    unsafe { bring_up(cfg, &mut fb, &mut gens, &mut engine, &mut ctrl) }.unwrap();
    assert!(gens.in_phase());
    (ExposureOrchestrator::new(ctrl, engine, fb, PrintSettings::from_board(cfg)), sim)
}

fn rig() -> (Rig, SimulatedDlpc) {
    rig_with(&board())
}

fn delays(rig: Rig) -> Vec<u32> {
    let (ctrl, _, _) = rig.into_parts();
    let (_, _, _, delay) = ctrl.release();
    delay.calls_ms().to_vec()
}

// ─── Single layer ────────────────────────────────────────────────────────────

#[test]
fn layer_walks_standby_configured_active_standby_in_register_order() {
    let (mut rig, sim) = rig();
    let layer = Layer::new(IlluminationPwm::new(600), FrameCount::new(60));

    let report = rig.run_layer(&layer, |fb| fb.set_pixel(0, 0, 3)).unwrap();

    assert_eq!(
        sim.write_opcodes(),
        vec![
            OP_MODE,         // park: standby
            OP_PRINT_CONFIG, // gamma / LED select
            OP_ORIENTATION,  // no flip
            OP_MODE,         // external print
            OP_PWM,          // duty
            OP_LAYER,        // light on
            OP_LAYER,        // light off
            OP_MODE,         // standby
        ]
    );
    assert_eq!(sim.writes_to(OP_MODE), vec![vec![0xFF], vec![0x06], vec![0xFF]]);
    assert_eq!(sim.writes_to(OP_PWM), vec![vec![0x58, 0x02]]);
    assert_eq!(sim.writes_to(OP_LAYER), vec![vec![0x00, 3, 0, 60, 0], vec![0x01, 0, 0, 0, 0]]);
    assert!(!sim.light_on());
    assert_eq!(sim.mode(), Some(Mode::Standby));
    assert_eq!(rig.controller().state(), DeviceState::Standby);

    assert_eq!(report.index, 0);
    assert_eq!(report.hold_ms, 1051);
    assert_eq!(report.readback_mismatches, 0);
    assert_eq!(rig.layers_done(), 1);

    // handshake, standby settle, print-mode settle, pre-exposure, hold, standby settle
    assert_eq!(delays(rig), vec![1000, 500, 500, 100, 1051, 500]);
}

#[test]
fn framebuffer_is_packed_while_the_light_is_off() {
    let (mut rig, sim) = rig();
    let layer = Layer::new(IlluminationPwm::FULL, FrameCount::new(1)).with_hold_ms(10);
    let observer = sim.clone();

    rig.run_layer(&layer, |fb| {
        assert!(!observer.light_on());
        assert_eq!(observer.mode(), Some(Mode::Standby));
        fb.set_pixel(1, 0, 2)
    })
    .unwrap();

    assert_eq!(rig.framebuffer().pixel(1, 0), Some(2));
}

#[test]
fn stale_pixels_are_cleared_between_layers() {
    let (mut rig, _sim) = rig();
    let layer = Layer::new(IlluminationPwm::FULL, FrameCount::new(1)).with_hold_ms(1);

    rig.run_layer(&layer, |fb| fb.set_pixel(5, 5, 3)).unwrap();
    rig.run_layer(&layer, |fb| fb.set_pixel(6, 5, 1)).unwrap();

    assert_eq!(rig.framebuffer().pixel(5, 5), Some(0));
    assert_eq!(rig.framebuffer().pixel(6, 5), Some(1));
    assert_eq!(rig.layers_done(), 2);
}

// ─── Multi-layer job ─────────────────────────────────────────────────────────

#[test]
fn job_exposes_each_image_and_the_loop_scans_out_the_last() {
    let cfg = board();
    let (mut rig, sim) = rig_with(&cfg);
    let len = cfg.framebuffer_len();
    let images: Vec<Vec<u8>> = (1..=3u8).map(|n| vec![n; len]).collect();
    let layer = Layer::new(IlluminationPwm::new(300), FrameCount::new(30));

    let report = rig.run_job(images.iter().map(|img| (layer, img.as_slice()))).unwrap();

    assert_eq!(report.layers, 3);
    assert_eq!(report.total_hold_ms, 3 * 551);
    assert_eq!(report.readback_mismatches, 0);
    assert_eq!(sim.writes_to(OP_LAYER).len(), 6);
    // Standby once up front, then print mode and standby per layer.
    assert_eq!(sim.writes_to(OP_MODE).len(), 1 + 3 * 2);

    let (_, mut engine, fb) = rig.into_parts();
    let cycles = engine.chain_mut().run_cycles(fb.as_bytes(), 3);
    assert_eq!(cycles.len(), 3);
    assert!(cycles.iter().all(|c| c.as_slice() == images[2].as_slice()));
}

#[test]
fn job_stops_at_a_mis_sized_image() {
    let (mut rig, sim) = rig();
    let layer = Layer::new(IlluminationPwm::FULL, FrameCount::new(1));
    let short = [0u8; 3];

    let err = rig.run_job([(layer, &short[..])]).unwrap_err();

    assert!(matches!(err, ExposureError::Framebuffer(FramebufferError::ImageSizeMismatch { actual: 3, .. })));
    assert!(!sim.wrote(OP_LAYER));
    assert_eq!(rig.controller().state(), DeviceState::Standby);
}

// ─── Exposure timing ─────────────────────────────────────────────────────────

#[test]
fn indefinite_exposure_without_hold_is_rejected_before_any_traffic() {
    let (mut rig, sim) = rig();
    sim.clear_log();
    let layer = Layer::new(IlluminationPwm::FULL, FrameCount::INDEFINITE);

    let err = rig.run_layer(&layer, |_| Ok(())).unwrap_err();

    assert_eq!(err, ExposureError::IndefiniteExposureWithoutHold);
    assert!(sim.writes().is_empty());
    assert!(sim.reads().is_empty());
}

#[test]
fn indefinite_exposure_with_hold_ends_with_explicit_light_off() {
    let (mut rig, sim) = rig();
    let layer = Layer::new(IlluminationPwm::FULL, FrameCount::INDEFINITE).with_hold_ms(2_500);

    let report = rig.run_layer(&layer, |_| Ok(())).unwrap();

    assert_eq!(report.hold_ms, 2_500);
    let layer_writes = sim.writes_to(OP_LAYER);
    assert_eq!(layer_writes[0], vec![0x00, 3, 0, 0xFF, 0xFF]);
    assert_eq!(layer_writes[1], vec![0x01, 0, 0, 0, 0]);
    assert!(!sim.light_on());
}

// ─── Transfer engine gating ──────────────────────────────────────────────────

#[test]
fn halted_video_is_restarted_before_exposure() {
    let (rig, _sim) = rig();
    let (ctrl, mut engine, fb) = rig.into_parts();
    engine.halt().unwrap();
    let mut rig = ExposureOrchestrator::new(ctrl, engine, fb, PrintSettings::from_board(&board()));

    rig.run_layer(&Layer::new(IlluminationPwm::FULL, FrameCount::new(1)), |_| Ok(())).unwrap();

    assert_eq!(rig.engine().state(), EngineState::Streaming);
    let origin = rig.framebuffer().origin_address();
    assert_eq!(rig.engine().chain().events().last(), Some(&ChainEvent::Trigger { origin }));
}

#[test]
fn unconfigured_video_refuses_to_expose() {
    let cfg = board();
    let sim = SimulatedDlpc::new();
    let fb = Framebuffer::new(vec![0u8; cfg.framebuffer_len()], cfg.width, cfg.height, cfg.pixel_format).unwrap();
    let ctrl = DlpcController::new(
        sim.clone(),
        ScriptedPin::new(&[]),
        ScriptedPin::new(&[]),
        RecordingDelay::new(),
        cfg.controller,
    );
    let mut rig: Rig =
        ExposureOrchestrator::new(ctrl, TransferEngine::new(SimulatedDmaChain::new()), fb, PrintSettings::from_board(&cfg));

    let err = rig.run_layer(&Layer::new(IlluminationPwm::FULL, FrameCount::new(1)), |_| Ok(())).unwrap_err();

    assert_eq!(err, ExposureError::VideoNotStreaming);
    assert!(sim.writes().is_empty());
}

#[test]
fn loop_bound_to_another_buffer_refuses_to_expose() {
    let cfg = board();
    let (rig, _sim) = rig_with(&cfg);
    let (ctrl, engine, _fb) = rig.into_parts();
    let other =
        Framebuffer::new(vec![0u8; cfg.framebuffer_len()], cfg.width, cfg.height, cfg.pixel_format).unwrap();
    let mut rig = ExposureOrchestrator::new(ctrl, engine, other, PrintSettings::from_board(&cfg));

    let err = rig.run_layer(&Layer::new(IlluminationPwm::FULL, FrameCount::new(1)), |_| Ok(())).unwrap_err();
    assert_eq!(err, ExposureError::VideoNotStreaming);
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[test]
fn absent_controller_aborts_the_layer_under_abort_policy() {
    let mut cfg = board();
    cfg.controller.nack = NackPolicy::Abort;
    let (mut rig, sim) = rig_with(&cfg);
    sim.set_present(false);

    let err = rig.run_layer(&Layer::new(IlluminationPwm::FULL, FrameCount::new(1)), |_| Ok(())).unwrap_err();

    assert!(matches!(err, ExposureError::Control(ControlError::BusNack { .. })));
    assert!(!err.is_fatal());
    assert_eq!(rig.layers_done(), 0);
    assert!(!sim.light_on());
}

#[test]
fn absent_controller_is_tolerated_under_continue_policy() {
    let (mut rig, sim) = rig();
    sim.set_present(false);

    let report = rig.run_layer(&Layer::new(IlluminationPwm::FULL, FrameCount::new(1)), |_| Ok(())).unwrap();

    assert_eq!(report.index, 0);
    assert!(rig.controller().tolerated_failures() > 0);
    assert_eq!(rig.controller().state(), DeviceState::Standby);
}

#[test]
fn draw_failure_leaves_the_light_off() {
    let (mut rig, sim) = rig();

    let err = rig
        .run_layer(&Layer::new(IlluminationPwm::FULL, FrameCount::new(1)), |fb| fb.set_pixel(0, 10_000, 1))
        .unwrap_err();

    assert_eq!(err, ExposureError::Framebuffer(FramebufferError::OutOfBounds { x: 0, y: 10_000 }));
    assert!(!sim.wrote(OP_LAYER));
    assert!(!sim.light_on());
}

// ─── Shutdown ────────────────────────────────────────────────────────────────

#[test]
fn shutdown_parks_the_controller_and_halts_video() {
    let (mut rig, sim) = rig();
    rig.controller_mut().enter_standby().unwrap();
    rig.controller_mut().enter_test_pattern(platform::TestPattern::GRID_240).unwrap();
    assert!(sim.wrote(OP_TEST_PATTERN));

    rig.shutdown().unwrap();
    rig.shutdown().unwrap();

    assert_eq!(sim.mode(), Some(Mode::Standby));
    assert_eq!(rig.engine().state(), EngineState::Armed);
    let events = rig.engine().chain().events();
    assert_eq!(events.iter().filter(|e| **e == ChainEvent::AbortRearm).count(), 1);
    assert_eq!(
        &events[events.len() - 2..],
        &[ChainEvent::AbortRearm, ChainEvent::AbortData]
    );
}
