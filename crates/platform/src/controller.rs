//! DLPC1438 device state machine.
//!
//! ```text
//!  Uninitialized ──power_on──▶ PoweredOn ──enter_test_pattern──▶ TestPattern
//!                                  │                                │
//!                                  └──────────enter_standby─────────┤
//!                                                                   ▼
//!        (any state) ─────────────enter_standby──────────────▶  Standby
//!                                                                   │
//!                                              configure_external_print
//!                                                                   ▼
//!                              ExternalPrintConfigured ◀──end_exposure──┐
//!                                          │                            │
//!                                        expose                         │
//!                                          ▼                            │
//!                                 ExternalPrintActive ──────────────────┘
//! ```
//!
//! Register order inside each transition is fixed: pattern parameters before
//! the TestPattern mode write, gamma and orientation before the ExternalPrint
//! mode write, PWM before the layer command, light-off before standby.
//!
//! The host state is a mirror of the last commanded mode. A transition
//! requested from the wrong state returns [`ControlError::InvalidTransition`]
//! and touches neither the bus nor the mirror.
//!
//! # Failure policy
//!
//! - Bus failures follow [`NackPolicy`]: by default they are logged and the
//!   sequence carries on as if the write landed.
//! - Read-back mismatches under [`VerifyPolicy::ReadBack`] are logged and
//!   counted, never returned.
//! - The mode read-back after entering TestPattern is mandatory. A mismatch
//!   returns [`ControlError::ModeReadbackMismatch`], the one fatal kind.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;

use crate::control_bus::{BusScan, ControlBus, ReadQuirk};
use crate::dlpc1438::{
    image_crc16, ExternalPrintConfig, FrameCount, IlluminationPwm, ImageOrientation, Mode, PrintLayerCommand,
    Register, TestPattern, DLPC1438_I2C_ADDR, FPGA_CONTROL_CRC16_ENABLE, REG_ACTIVE_BUFFER,
    REG_CRC16, REG_EXTERNAL_PRINT_CONFIG, REG_FPGA_CONTROL, REG_ILLUMINATION_PWM,
    REG_IMAGE_ORIENTATION, REG_OPERATING_MODE, REG_PRINT_LAYER_CONTROL, REG_TEST_PATTERN,
    REG_VIDEO_INTERFACE, VIDEO_INTERFACE_ENABLE,
};
use crate::error::ControlError;
use crate::handshake::{self, HandshakeOutcome, ReadyPolicy};

/// Host-side mirror of the controller's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    /// Power-enable not yet asserted.
    Uninitialized,
    /// Handshake complete; mode untouched since boot.
    PoweredOn,
    /// Light off, mirrors parked.
    Standby,
    /// Internal test pattern on screen.
    TestPattern,
    /// External print mode selected, light off.
    ExternalPrintConfigured,
    /// Layer command issued; light on or pending dark frames.
    ExternalPrintActive,
}

impl DeviceState {
    /// Name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::PoweredOn => "powered on",
            Self::Standby => "standby",
            Self::TestPattern => "test pattern",
            Self::ExternalPrintConfigured => "external print configured",
            Self::ExternalPrintActive => "external print active",
        }
    }

    /// Every state, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Uninitialized,
        Self::PoweredOn,
        Self::Standby,
        Self::TestPattern,
        Self::ExternalPrintConfigured,
        Self::ExternalPrintActive,
    ];
}

/// Whether register writes are read back and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VerifyPolicy {
    /// Write only.
    Off,
    /// Read every written register back; mismatches are logged and counted.
    #[default]
    ReadBack,
}

/// What a bus failure inside a transition does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NackPolicy {
    /// Log and carry on; the state mirror follows the commanded transition.
    #[default]
    Continue,
    /// Return the error; the state mirror is left where it was.
    Abort,
}

/// Minimum waits the controller needs between configuration steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SettleDelays {
    /// After writing test pattern parameters, before the mode write.
    pub after_pattern_params_ms: u32,
    /// After any mode-select write.
    pub after_mode_switch_ms: u32,
    /// After the PWM write, before the layer command.
    pub before_exposure_ms: u32,
}

impl SettleDelays {
    /// Delays used on the shipped board.
    pub const DLP_PICO: Self =
        Self { after_pattern_params_ms: 300, after_mode_switch_ms: 500, before_exposure_ms: 100 };

    /// No waits. Host tests only.
    pub const NONE: Self = Self { after_pattern_params_ms: 0, after_mode_switch_ms: 0, before_exposure_ms: 0 };
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self::DLP_PICO
    }
}

/// Control-path configuration handed to [`DlpcController::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerConfig {
    /// 7-bit bus address.
    pub address: u8,
    /// Read-path quirk of the controller revision.
    pub read_quirk: ReadQuirk,
    /// Power-on wait strategy.
    pub ready: ReadyPolicy,
    /// Inter-write settle times.
    pub settle: SettleDelays,
    /// Read-back verification.
    pub verify: VerifyPolicy,
    /// Bus failure handling.
    pub nack: NackPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            address: DLPC1438_I2C_ADDR,
            read_quirk: ReadQuirk::None,
            ready: ReadyPolicy::default(),
            settle: SettleDelays::default(),
            verify: VerifyPolicy::default(),
            nack: NackPolicy::default(),
        }
    }
}

/// DLPC1438 controller driver.
///
/// Generic over:
/// - `I`: [`embedded_hal::i2c::I2c`] control bus.
/// - `PWR`: power-enable [`OutputPin`].
/// - `RDY`: ready [`InputPin`] (1.8 V, unreliable).
/// - `D`: [`DelayNs`] used for every settle wait.
pub struct DlpcController<I, PWR, RDY, D> {
    bus: ControlBus<I>,
    power: PWR,
    ready: RDY,
    delay: D,
    config: ControllerConfig,
    state: DeviceState,
    mismatches: u32,
    tolerated: u32,
    last_mismatch: Option<ControlError>,
}

impl<I, PWR, RDY, D> DlpcController<I, PWR, RDY, D>
where
    I: I2c,
    PWR: OutputPin,
    RDY: InputPin,
    D: DelayNs,
{
    /// Create a driver in [`DeviceState::Uninitialized`]. No bus traffic.
    pub fn new(i2c: I, power: PWR, ready: RDY, delay: D, config: ControllerConfig) -> Self {
        Self {
            bus: ControlBus::new(i2c, config.address, config.read_quirk),
            power,
            ready,
            delay,
            config,
            state: DeviceState::Uninitialized,
            mismatches: 0,
            tolerated: 0,
            last_mismatch: None,
        }
    }

    /// Current mirrored state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Configuration in effect.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Read-back mismatches seen so far.
    pub fn readback_mismatches(&self) -> u32 {
        self.mismatches
    }

    /// Most recent read-back mismatch.
    pub fn last_mismatch(&self) -> Option<ControlError> {
        self.last_mismatch
    }

    /// Bus failures swallowed under [`NackPolicy::Continue`].
    pub fn tolerated_failures(&self) -> u32 {
        self.tolerated
    }

    /// Delay provider, for callers that hold between commands.
    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    /// Raw bus access for diagnostics.
    pub fn bus_mut(&mut self) -> &mut ControlBus<I> {
        &mut self.bus
    }

    /// Tear down and hand back the peripherals.
    pub fn release(self) -> (I, PWR, RDY, D) {
        (self.bus.release(), self.power, self.ready, self.delay)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Uninitialized → PoweredOn: assert power-enable and wait for ready.
    pub fn power_on(&mut self) -> Result<HandshakeOutcome, ControlError> {
        self.require(DeviceState::PoweredOn, &[DeviceState::Uninitialized])?;
        let outcome =
            handshake::power_on(&mut self.power, &mut self.ready, &mut self.delay, self.config.ready)?;
        self.commit(DeviceState::PoweredOn);
        Ok(outcome)
    }

    /// PoweredOn | Standby | TestPattern → TestPattern.
    ///
    /// Parameters go out first, then the mode write. The mode is always read
    /// back afterwards; a mismatch is fatal.
    pub fn enter_test_pattern(&mut self, pattern: TestPattern) -> Result<(), ControlError> {
        self.require(
            DeviceState::TestPattern,
            &[DeviceState::PoweredOn, DeviceState::Standby, DeviceState::TestPattern],
        )?;
        self.write_checked(&REG_TEST_PATTERN, &pattern.to_bytes())?;
        self.delay.delay_ms(self.config.settle.after_pattern_params_ms);
        self.switch_mode(Mode::TestPattern)?;
        self.confirm_mode(Mode::TestPattern)?;
        self.commit(DeviceState::TestPattern);
        Ok(())
    }

    /// Any state → Standby. From ExternalPrintActive the light is switched off first.
    pub fn enter_standby(&mut self) -> Result<(), ControlError> {
        if self.state == DeviceState::ExternalPrintActive {
            self.write_checked(&REG_PRINT_LAYER_CONTROL, &PrintLayerCommand::LIGHT_OFF.to_bytes())?;
        }
        self.switch_mode(Mode::Standby)?;
        self.commit(DeviceState::Standby);
        Ok(())
    }

    /// Standby → ExternalPrintConfigured: gamma/LED select, orientation, mode.
    pub fn configure_external_print(
        &mut self,
        print: ExternalPrintConfig,
        orientation: ImageOrientation,
    ) -> Result<(), ControlError> {
        self.require(DeviceState::ExternalPrintConfigured, &[DeviceState::Standby])?;
        self.write_checked(&REG_EXTERNAL_PRINT_CONFIG, &print.to_bytes())?;
        self.write_checked(&REG_IMAGE_ORIENTATION, &[orientation.to_byte()])?;
        self.switch_mode(Mode::ExternalPrint)?;
        self.commit(DeviceState::ExternalPrintConfigured);
        Ok(())
    }

    /// ExternalPrintConfigured → ExternalPrintActive: PWM, settle, layer command.
    ///
    /// With `exposure == FrameCount::INDEFINITE` the light stays on until
    /// [`Self::end_exposure`] or [`Self::enter_standby`].
    pub fn expose(
        &mut self,
        pwm: IlluminationPwm,
        dark: FrameCount,
        exposure: FrameCount,
    ) -> Result<(), ControlError> {
        self.require(DeviceState::ExternalPrintActive, &[DeviceState::ExternalPrintConfigured])?;
        self.write_checked(&REG_ILLUMINATION_PWM, &pwm.to_bytes())?;
        self.delay.delay_ms(self.config.settle.before_exposure_ms);
        let cmd = PrintLayerCommand::expose(dark, exposure);
        self.write_checked(&REG_PRINT_LAYER_CONTROL, &cmd.to_bytes())?;
        info!(
            "exposure: pwm {}, {} dark + {} lit frames",
            pwm.get(),
            dark.get(),
            exposure.get()
        );
        self.commit(DeviceState::ExternalPrintActive);
        Ok(())
    }

    /// ExternalPrintActive → ExternalPrintConfigured: light off, stay in print mode.
    pub fn end_exposure(&mut self) -> Result<(), ControlError> {
        self.require(DeviceState::ExternalPrintConfigured, &[DeviceState::ExternalPrintActive])?;
        self.write_checked(&REG_PRINT_LAYER_CONTROL, &PrintLayerCommand::LIGHT_OFF.to_bytes())?;
        self.commit(DeviceState::ExternalPrintConfigured);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries and FPGA front-end
    // -----------------------------------------------------------------------

    /// Read the mode the controller reports. `None` for an unknown byte.
    pub fn query_mode(&mut self) -> Result<Option<Mode>, ControlError> {
        let raw = self.bus.read_byte(&REG_OPERATING_MODE)?;
        let mode = Mode::from_wire(raw);
        if mode.is_none() {
            warn!("controller reports unknown mode {:#x}", raw);
        }
        Ok(mode)
    }

    /// True when the controller acknowledges its address.
    pub fn is_present(&mut self) -> Result<bool, ControlError> {
        self.bus.is_present()
    }

    /// Scan the whole bus.
    pub fn scan_bus(&mut self) -> BusScan {
        self.bus.scan()
    }

    /// Set the CRC16 check bit in FPGA control, keeping the other bits.
    pub fn enable_crc16(&mut self) -> Result<(), ControlError> {
        self.set_bits(&REG_FPGA_CONTROL, FPGA_CONTROL_CRC16_ENABLE)
    }

    /// Enable the parallel video interface, keeping the other bits.
    pub fn enable_video_interface(&mut self) -> Result<(), ControlError> {
        self.set_bits(&REG_VIDEO_INTERFACE, VIDEO_INTERFACE_ENABLE)
    }

    /// Select the FPGA front-end buffer the controller displays.
    pub fn set_active_buffer(&mut self, index: u8) -> Result<(), ControlError> {
        self.write_checked(&REG_ACTIVE_BUFFER, &[index])
    }

    /// CRC16 of the last received image.
    pub fn read_crc16(&mut self) -> Result<u16, ControlError> {
        let mut raw = [0u8; 2];
        self.bus.read(REG_CRC16.read, &mut raw)?;
        Ok(u16::from_le_bytes(raw))
    }

    /// Compare the controller's CRC16 with one computed over `image`.
    pub fn image_crc_matches(&mut self, image: &[u8]) -> Result<bool, ControlError> {
        let reported = self.read_crc16()?;
        let computed = image_crc16(image);
        if reported != computed {
            warn!("image crc16 {:#x}, computed {:#x}", reported, computed);
        }
        Ok(reported == computed)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require(&self, to: DeviceState, from: &[DeviceState]) -> Result<(), ControlError> {
        if from.contains(&self.state) {
            Ok(())
        } else {
            warn!("rejected transition {} -> {}", self.state.as_str(), to.as_str());
            Err(ControlError::InvalidTransition { from: self.state, to })
        }
    }

    fn commit(&mut self, to: DeviceState) {
        info!("state {} -> {}", self.state.as_str(), to.as_str());
        self.state = to;
    }

    /// Apply [`NackPolicy`] to a bus failure.
    fn tolerate(&mut self, err: ControlError) -> Result<(), ControlError> {
        match (self.config.nack, err) {
            (NackPolicy::Continue, ControlError::BusNack { .. } | ControlError::Bus { .. }) => {
                error!("{}: continuing", err.as_str());
                self.tolerated = self.tolerated.saturating_add(1);
                Ok(())
            }
            _ => Err(err),
        }
    }

    fn write_checked(&mut self, reg: &Register, data: &[u8]) -> Result<(), ControlError> {
        match self.bus.write_register(reg, data) {
            Ok(()) if self.config.verify == VerifyPolicy::ReadBack => self.verify(reg, data),
            Ok(()) => Ok(()),
            Err(e) => self.tolerate(e),
        }
    }

    fn verify(&mut self, reg: &Register, expected: &[u8]) -> Result<(), ControlError> {
        let actual = match self.bus.read_register(reg) {
            Ok(a) => a,
            Err(e) => return self.tolerate(e),
        };
        if let Some(m) = first_mismatch(reg.id(), expected, &actual) {
            if let ControlError::RegisterMismatch { index, expected, actual, .. } = m {
                warn!(
                    "read-back {} byte {}: wrote {:#x}, read {:#x}",
                    reg.name, index, expected, actual
                );
            }
            self.mismatches = self.mismatches.saturating_add(1);
            self.last_mismatch = Some(m);
        }
        Ok(())
    }

    /// Write mode-select unless the controller already reports `mode`.
    fn switch_mode(&mut self, mode: Mode) -> Result<(), ControlError> {
        match self.bus.read_byte(&REG_OPERATING_MODE) {
            Ok(current) if current == mode.wire() => {
                debug!("already in {}; mode write skipped", mode.as_str());
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => debug!("mode pre-read failed ({}); writing anyway", e.as_str()),
        }

        let data = [mode.wire()];
        match self.bus.write_register(&REG_OPERATING_MODE, &data) {
            Ok(()) => {}
            Err(e) => {
                self.tolerate(e)?;
                return Ok(());
            }
        }
        self.delay.delay_ms(self.config.settle.after_mode_switch_ms);

        if mode != Mode::TestPattern && self.config.verify == VerifyPolicy::ReadBack {
            self.verify(&REG_OPERATING_MODE, &data)?;
        }
        Ok(())
    }

    /// Mandatory read-back. Bus failures propagate regardless of [`NackPolicy`].
    fn confirm_mode(&mut self, mode: Mode) -> Result<(), ControlError> {
        let actual = self.bus.read_byte(&REG_OPERATING_MODE)?;
        if actual == mode.wire() {
            debug!("mode read-back confirmed {}", mode.as_str());
            Ok(())
        } else {
            error!("mode read-back {:#x}, expected {:#x}", actual, mode.wire());
            Err(ControlError::ModeReadbackMismatch { expected: mode.wire(), actual })
        }
    }

    /// Read-modify-write. A tolerated read failure skips the write: writing
    /// `bits` alone would clear whatever else the register holds.
    fn set_bits(&mut self, reg: &Register, bits: u8) -> Result<(), ControlError> {
        let current = match self.bus.read_byte(reg) {
            Ok(c) => c,
            Err(e) => {
                self.tolerate(e)?;
                warn!("{} not read; bits {:#x} left unset", reg.name, bits);
                return Ok(());
            }
        };
        self.write_checked(reg, &[current | bits])
    }
}

/// First differing byte between what was written and what came back.
pub fn first_mismatch(register: u8, expected: &[u8], actual: &[u8]) -> Option<ControlError> {
    expected
        .iter()
        .zip(actual.iter())
        .enumerate()
        .find(|(_, (e, a))| e != a)
        .map(|(index, (&expected, &actual))| ControlError::RegisterMismatch {
            register,
            index,
            expected,
            actual,
        })
}
