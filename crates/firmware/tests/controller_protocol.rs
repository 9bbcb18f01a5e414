//! DLPC1438 control-path scenarios against the simulated controller.
//!
//! The simulator stores registers under their write opcode, answers reads on
//! the paired read opcode and tracks whether the light engine is lit, so
//! these tests check behaviour end to end rather than byte scripts.
//!
//! Run with: cargo test -p firmware --test controller_protocol

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use platform::mocks::{RecordingDelay, ScriptedPin, SimulatedDlpc};
use platform::{
    ControlBus, ControlError, ControllerConfig, DeviceState, DlpcController, ExternalPrintConfig, FrameCount,
    HandshakeOutcome, IlluminationPwm, ImageOrientation, Mode, NackPolicy, ReadQuirk, ReadyPolicy, SettleDelays,
    TestPattern,
};

type Ctrl = DlpcController<SimulatedDlpc, ScriptedPin, ScriptedPin, RecordingDelay>;

fn config() -> ControllerConfig {
    ControllerConfig { ready: ReadyPolicy::fixed(1000), ..ControllerConfig::default() }
}

fn controller_with(sim: &SimulatedDlpc, cfg: ControllerConfig) -> Ctrl {
    DlpcController::new(sim.clone(), ScriptedPin::new(&[]), ScriptedPin::new(&[false]), RecordingDelay::new(), cfg)
}

fn powered() -> (Ctrl, SimulatedDlpc) {
    let sim = SimulatedDlpc::new();
    let mut ctrl = controller_with(&sim, config());
    ctrl.power_on().unwrap();
    (ctrl, sim)
}

/// Drive a fresh controller into `target` through legal transitions.
fn driven_to(target: DeviceState) -> (Ctrl, SimulatedDlpc) {
    let sim = SimulatedDlpc::new();
    let mut ctrl = controller_with(&sim, config());
    let steps: &[DeviceState] = match target {
        DeviceState::Uninitialized => &[],
        DeviceState::PoweredOn => &[DeviceState::PoweredOn],
        DeviceState::Standby => &[DeviceState::PoweredOn, DeviceState::Standby],
        DeviceState::TestPattern => &[DeviceState::PoweredOn, DeviceState::TestPattern],
        DeviceState::ExternalPrintConfigured => {
            &[DeviceState::PoweredOn, DeviceState::Standby, DeviceState::ExternalPrintConfigured]
        }
        DeviceState::ExternalPrintActive => &[
            DeviceState::PoweredOn,
            DeviceState::Standby,
            DeviceState::ExternalPrintConfigured,
            DeviceState::ExternalPrintActive,
        ],
    };
    for step in steps {
        match step {
            DeviceState::PoweredOn => {
                ctrl.power_on().unwrap();
            }
            DeviceState::Standby => ctrl.enter_standby().unwrap(),
            DeviceState::TestPattern => ctrl.enter_test_pattern(TestPattern::GRID_240).unwrap(),
            DeviceState::ExternalPrintConfigured => {
                ctrl.configure_external_print(ExternalPrintConfig::LINEAR, ImageOrientation::NONE).unwrap();
            }
            DeviceState::ExternalPrintActive => {
                ctrl.expose(IlluminationPwm::FULL, FrameCount::new(3), FrameCount::new(10)).unwrap();
            }
            DeviceState::Uninitialized => {}
        }
    }
    assert_eq!(ctrl.state(), target);
    (ctrl, sim)
}

// ─── Test pattern ────────────────────────────────────────────────────────────

#[test]
fn grid_pattern_writes_parameters_then_mode_and_reads_back_0x01() {
    let (mut ctrl, sim) = powered();

    ctrl.enter_test_pattern(TestPattern::GRID_240).unwrap();

    assert_eq!(sim.writes(), vec![(0x0B, vec![0x87, 0, 240, 0, 240, 0]), (0x05, vec![0x01])]);
    assert_eq!(sim.reads().last(), Some(&0x06));
    assert_eq!(sim.mode(), Some(Mode::TestPattern));
    assert_eq!(ctrl.state(), DeviceState::TestPattern);
}

#[test]
fn line_pattern_preset_reaches_test_pattern_mode() {
    let (mut ctrl, sim) = powered();

    firmware::patterns::show_test_lines(&mut ctrl).unwrap();

    assert_eq!(sim.writes_to(0x0B), vec![vec![0x86, 0, 8, 8, 8, 8]]);
    assert_eq!(ctrl.state(), DeviceState::TestPattern);
}

#[test]
fn dropped_mode_write_is_the_one_fatal_failure() {
    let (mut ctrl, sim) = powered();
    // Parameters and mode select both vanish.
    sim.drop_next_writes(2);

    let err = ctrl.enter_test_pattern(TestPattern::GRID_240).unwrap_err();

    assert_eq!(err, ControlError::ModeReadbackMismatch { expected: 0x01, actual: 0x02 });
    assert!(err.is_fatal());
    assert_eq!(ctrl.state(), DeviceState::PoweredOn);
    // The parameter read-back mismatch before it was only counted.
    assert_eq!(ctrl.readback_mismatches(), 1);
    assert!(matches!(ctrl.last_mismatch(), Some(ControlError::RegisterMismatch { register: 0x0B, .. })));
}

#[test]
fn non_pattern_readback_mismatch_is_logged_not_returned() {
    let (mut ctrl, sim) = powered();
    sim.drop_next_writes(1);

    ctrl.enter_standby().unwrap();

    assert_eq!(ctrl.state(), DeviceState::Standby);
    assert_eq!(ctrl.readback_mismatches(), 1);
    assert_eq!(
        ctrl.last_mismatch(),
        Some(ControlError::RegisterMismatch { register: 0x05, index: 0, expected: 0xFF, actual: 0x02 })
    );
}

// ─── External print ──────────────────────────────────────────────────────────

#[test]
fn indefinite_exposure_stays_lit_until_light_off() {
    let (mut ctrl, sim) = driven_to(DeviceState::ExternalPrintConfigured);

    ctrl.expose(IlluminationPwm::new(1023), FrameCount::new(3), FrameCount::INDEFINITE).unwrap();
    sim.elapse_frames(1_000_000);
    assert!(sim.light_on());

    ctrl.end_exposure().unwrap();

    assert!(!sim.light_on());
    assert_eq!(sim.writes_to(0xC1).last(), Some(&vec![0x01, 0, 0, 0, 0]));
    assert_eq!(ctrl.state(), DeviceState::ExternalPrintConfigured);
    assert_eq!(sim.mode(), Some(Mode::ExternalPrint));
}

#[test]
fn finite_exposure_goes_dark_on_its_own() {
    let (_ctrl, sim) = driven_to(DeviceState::ExternalPrintActive);
    assert!(sim.light_on());
    sim.elapse_frames(12);
    assert!(sim.light_on());
    sim.elapse_frames(1);
    assert!(!sim.light_on());
}

#[test]
fn external_print_configuration_precedes_the_mode_write() {
    let (_ctrl, sim) = driven_to(DeviceState::ExternalPrintConfigured);
    let ops = sim.write_opcodes();
    let config = ops.iter().position(|&op| op == 0xA8).unwrap();
    let orientation = ops.iter().position(|&op| op == 0x14).unwrap();
    let mode = ops.iter().rposition(|&op| op == 0x05).unwrap();
    assert!(config < orientation && orientation < mode);
    assert_eq!(sim.writes_to(0x05).last(), Some(&vec![0x06]));
}

#[test]
fn standby_from_active_switches_the_light_off_first() {
    let (mut ctrl, sim) = driven_to(DeviceState::ExternalPrintActive);
    sim.clear_log();

    ctrl.enter_standby().unwrap();

    assert_eq!(sim.write_opcodes(), vec![0xC1, 0x05]);
    assert!(!sim.light_on());
    assert_eq!(sim.mode(), Some(Mode::Standby));
}

// ─── State machine ───────────────────────────────────────────────────────────

#[test]
fn standby_is_one_step_from_every_state() {
    for state in DeviceState::ALL {
        let (mut ctrl, sim) = driven_to(state);
        ctrl.enter_standby().unwrap();
        assert_eq!(ctrl.state(), DeviceState::Standby, "from {}", state.as_str());
        assert_eq!(sim.mode(), Some(Mode::Standby), "from {}", state.as_str());
    }
}

#[test]
fn out_of_order_requests_touch_neither_bus_nor_state() {
    let (mut ctrl, sim) = driven_to(DeviceState::Standby);
    sim.clear_log();

    assert!(matches!(
        ctrl.expose(IlluminationPwm::FULL, FrameCount::ZERO, FrameCount::new(1)),
        Err(ControlError::InvalidTransition { from: DeviceState::Standby, to: DeviceState::ExternalPrintActive })
    ));
    assert!(matches!(ctrl.end_exposure(), Err(ControlError::InvalidTransition { .. })));
    assert!(matches!(ctrl.power_on(), Err(ControlError::InvalidTransition { .. })));

    assert_eq!(ctrl.state(), DeviceState::Standby);
    assert!(sim.writes().is_empty());
    assert!(sim.reads().is_empty());
}

#[test]
fn standby_from_uninitialized_without_a_device() {
    let sim = SimulatedDlpc::new();
    sim.set_present(false);

    let mut strict = controller_with(&sim, ControllerConfig { nack: NackPolicy::Abort, ..config() });
    assert!(matches!(strict.enter_standby(), Err(ControlError::BusNack { register: 0x05 })));
    assert_eq!(strict.state(), DeviceState::Uninitialized);

    let mut lenient = controller_with(&sim, config());
    lenient.enter_standby().unwrap();
    assert_eq!(lenient.state(), DeviceState::Standby);
    assert_eq!(lenient.tolerated_failures(), 1);
}

#[test]
fn repeated_mode_request_is_not_rewritten() {
    let (mut ctrl, sim) = driven_to(DeviceState::Standby);
    sim.clear_log();

    ctrl.enter_standby().unwrap();

    assert!(sim.writes().is_empty());
    assert_eq!(sim.reads(), vec![0x06]);
    assert_eq!(ctrl.query_mode().unwrap(), Some(Mode::Standby));
}

// ─── Handshake ───────────────────────────────────────────────────────────────

#[test]
fn silent_ready_line_falls_back_after_the_poll_window() {
    let sim = SimulatedDlpc::new();
    let cfg = ControllerConfig { settle: SettleDelays::NONE, ..ControllerConfig::default() };
    let mut ctrl = controller_with(&sim, cfg);

    let outcome = ctrl.power_on().unwrap();

    assert_eq!(outcome, HandshakeOutcome::FellBack { waited_ms: 1000 });
    assert_eq!(ctrl.state(), DeviceState::PoweredOn);
    let (_, power, _, delay) = ctrl.release();
    assert_eq!(power.driven(), &[true]);
    assert_eq!(delay.calls_ms().last(), Some(&1000));
    assert_eq!(delay.total_ms(), 2000 + 1000);
}

#[test]
fn ready_pulse_completes_the_handshake_without_fallback() {
    let sim = SimulatedDlpc::new();
    let mut ctrl = DlpcController::new(
        sim,
        ScriptedPin::new(&[]),
        ScriptedPin::new(&[false, false, true, true, true, false]),
        RecordingDelay::new(),
        ControllerConfig::default(),
    );

    assert_eq!(ctrl.power_on().unwrap(), HandshakeOutcome::EdgeDetected { elapsed_ms: 5 });
}

// ─── Bus driver ──────────────────────────────────────────────────────────────

#[test]
fn write_then_read_round_trips_with_leading_byte_stripped() {
    let sim = SimulatedDlpc::new().with_leading_byte(0x5A);
    let mut bus = ControlBus::new(sim.clone(), 0x1B, ReadQuirk::LeadingByte);

    bus.write(0x54, &[0x10, 0x02]).unwrap();
    let mut back = [0u8; 2];
    let outcome = bus.read(0x55, &mut back).unwrap();

    assert_eq!(back, [0x10, 0x02]);
    assert_eq!(outcome.leading, Some(0x5A));
}

#[test]
fn unstripped_leading_byte_shifts_the_payload() {
    let sim = SimulatedDlpc::new().with_leading_byte(0x5A);
    let mut bus = ControlBus::new(sim, 0x1B, ReadQuirk::None);

    bus.write(0x54, &[0x10, 0x02]).unwrap();
    let mut back = [0u8; 2];
    bus.read(0x55, &mut back).unwrap();

    assert_eq!(back, [0x5A, 0x10]);
}

#[test]
fn scan_and_presence_check_find_only_the_controller() {
    let (mut ctrl, sim) = powered();

    let scan = ctrl.scan_bus();
    assert_eq!(scan.responders().collect::<Vec<_>>(), vec![0x1B]);
    assert!(scan.render().contains("10 . . . . . . . . . . . @ . . . ."));
    assert!(ctrl.is_present().unwrap());

    sim.set_present(false);
    assert!(!ctrl.is_present().unwrap());
}

// ─── FPGA front-end ──────────────────────────────────────────────────────────

#[test]
fn crc16_and_video_interface_controls() {
    let (mut ctrl, sim) = powered();
    sim.set_register(0xCA, &[0b0000_0001]);

    ctrl.enable_crc16().unwrap();
    ctrl.enable_video_interface().unwrap();
    ctrl.set_active_buffer(1).unwrap();

    assert_eq!(sim.register(0xCA), Some(vec![0b0000_0101]));
    assert_eq!(sim.register(0xC3), Some(vec![0b0000_0001]));
    assert_eq!(sim.register(0xC5), Some(vec![1]));

    let image = [0xAAu8; 64];
    let crc = platform::dlpc1438::image_crc16(&image);
    sim.set_register(0xCE, &crc.to_le_bytes());
    assert_eq!(ctrl.read_crc16().unwrap(), crc);
    assert!(ctrl.image_crc_matches(&image).unwrap());
    assert!(!ctrl.image_crc_matches(&[0x55; 64]).unwrap());
}
