//! Control-path error taxonomy.
//!
//! | Kind | Raised by | Fatal |
//! |------|-----------|-------|
//! | [`ControlError::BusNack`] | any register transaction | caller decides |
//! | [`ControlError::Bus`] | any register transaction | caller decides |
//! | [`ControlError::RegisterMismatch`] | read-back verification | no, logged |
//! | [`ControlError::ModeReadbackMismatch`] | TestPattern entry only | **yes** |
//! | [`ControlError::InvalidTransition`] | device state machine | no, nothing was written |
//!
//! Only the mode-select read-back after entering TestPattern stops the
//! program. [`ControlError::is_fatal`] encodes that.

use embedded_hal::i2c::ErrorKind;
use thiserror_no_std::Error;

use crate::controller::DeviceState;

/// Errors raised on the control path (bus driver, handshake, state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    /// The controller did not acknowledge (absent, unpowered or wrong address).
    #[error("no acknowledgment for register {register:#04x}")]
    BusNack {
        /// Register opcode of the failed transaction.
        register: u8,
    },

    /// Any other bus failure reported by the HAL.
    #[error("bus error on register {register:#04x}: {kind:?}")]
    Bus {
        /// Register opcode of the failed transaction.
        register: u8,
        /// HAL error classification.
        kind: ErrorKind,
    },

    /// A post-write read-back disagreed with what was written.
    #[error("register {register:#04x} byte {index}: wrote {expected:#04x}, read {actual:#04x}")]
    RegisterMismatch {
        /// Write opcode of the verified register.
        register: u8,
        /// Index of the first differing byte.
        index: usize,
        /// Byte that was written.
        expected: u8,
        /// Byte that was read back.
        actual: u8,
    },

    /// Mode-select read-back after entering TestPattern did not match.
    #[error("mode-select read back {actual:#04x}, expected {expected:#04x}")]
    ModeReadbackMismatch {
        /// Wire value that was commanded.
        expected: u8,
        /// Wire value the controller reported.
        actual: u8,
    },

    /// Transition requested from a state that is not one of its predecessors.
    #[error("transition {from:?} -> {to:?} is not allowed")]
    InvalidTransition {
        /// State the machine was in (unchanged).
        from: DeviceState,
        /// State that was requested.
        to: DeviceState,
    },

    /// A read longer than the driver's scratch buffer was requested.
    #[error("read of {len} bytes exceeds the driver limit")]
    ReadTooLong {
        /// Requested payload length.
        len: usize,
    },

    /// A write longer than the driver's scratch buffer was requested.
    #[error("write of {len} bytes exceeds the driver limit")]
    WriteTooLong {
        /// Requested payload length.
        len: usize,
    },

    /// A write was addressed to a read-only register.
    #[error("register {register:#04x} is read-only")]
    ReadOnlyRegister {
        /// Read opcode of the register.
        register: u8,
    },

    /// A handshake GPIO could not be driven.
    #[error("GPIO error")]
    Gpio,
}

impl ControlError {
    /// Classify a HAL bus error for `register`.
    pub fn from_bus<E: embedded_hal::i2c::Error>(register: u8, err: &E) -> Self {
        match err.kind() {
            ErrorKind::NoAcknowledge(_) => Self::BusNack { register },
            kind => Self::Bus { register, kind },
        }
    }

    /// True only for the TestPattern mode read-back mismatch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ModeReadbackMismatch { .. })
    }

    /// True for failures that mean "the device did not answer".
    pub fn is_nack(&self) -> bool {
        matches!(self, Self::BusNack { .. })
    }

    /// Short, allocation-free label for log backends that cannot format enums.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BusNack { .. } => "bus nack",
            Self::Bus { .. } => "bus error",
            Self::RegisterMismatch { .. } => "register mismatch",
            Self::ModeReadbackMismatch { .. } => "mode read-back mismatch",
            Self::InvalidTransition { .. } => "invalid transition",
            Self::ReadTooLong { .. } => "read too long",
            Self::WriteTooLong { .. } => "write too long",
            Self::ReadOnlyRegister { .. } => "read-only register",
            Self::Gpio => "gpio error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::NoAcknowledgeSource;

    #[test]
    fn only_mode_readback_mismatch_is_fatal() {
        let fatal = ControlError::ModeReadbackMismatch { expected: 0x01, actual: 0xFF };
        assert!(fatal.is_fatal());

        let others = [
            ControlError::BusNack { register: 0x05 },
            ControlError::Bus { register: 0x05, kind: ErrorKind::Bus },
            ControlError::RegisterMismatch { register: 0xA8, index: 0, expected: 1, actual: 0 },
            ControlError::InvalidTransition {
                from: DeviceState::Uninitialized,
                to: DeviceState::ExternalPrintActive,
            },
            ControlError::ReadTooLong { len: 99 },
            ControlError::WriteTooLong { len: 99 },
            ControlError::ReadOnlyRegister { register: 0xCE },
            ControlError::Gpio,
        ];
        for e in others {
            assert!(!e.is_fatal(), "{} must not be fatal", e.as_str());
        }
    }

    #[test]
    fn no_acknowledge_maps_to_bus_nack() {
        let e = ControlError::from_bus(
            0x06,
            &ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
        );
        assert_eq!(e, ControlError::BusNack { register: 0x06 });
        assert!(e.is_nack());
    }

    #[test]
    fn other_kinds_map_to_bus() {
        let e = ControlError::from_bus(0x06, &ErrorKind::ArbitrationLoss);
        assert_eq!(e, ControlError::Bus { register: 0x06, kind: ErrorKind::ArbitrationLoss });
        assert!(!e.is_nack());
    }

    #[test]
    fn display_includes_register() {
        use std::string::ToString;
        let s = ControlError::BusNack { register: 0x1B }.to_string();
        assert!(s.contains("0x1b"), "{s}");
    }
}
