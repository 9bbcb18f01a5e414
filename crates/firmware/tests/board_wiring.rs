//! Integration test: the GPIOs the RP2040 binary claims match the board.
//!
//! Tests that:
//!   1. Every pin the binary hands to I2C1, GPIO and PIO0 passes `Pins::check`
//!   2. The pixel bus is eight consecutive GPIOs, as `out pins, 8` needs
//!   3. The data channel is paced by the pixel state machine's TX DREQ
//!   4. The bus clock the binary programs into I2C1 stays under 100 kHz
//!
//! Does NOT require physical hardware.
//!
//! Run with: cargo test -p firmware --test board_wiring

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use platform::{BoardConfig, PinError, PinRole};

/// (role, GPIO) exactly as `src/main.rs` wires them.
const CLAIMED: [(PinRole, u8); 8] = [
    (PinRole::Sda, 6),
    (PinRole::Scl, 7),
    (PinRole::PowerEnable, 22),
    (PinRole::Ready, 21),
    (PinRole::HSync, 19),
    (PinRole::VSync, 17),
    (PinRole::DataEnable, 18),
    (PinRole::PixelClock, 16),
];

/// First pixel-data GPIO claimed by the binary (PIN_8..=PIN_15).
const CLAIMED_PIXEL_BASE: u8 = 8;

/// DREQ_PIO0_TX0 + pixel state machine index.
const DREQ_PIO0_TX2: u8 = 2;

#[test]
fn binary_pin_claims_match_the_board() {
    let board = BoardConfig::dlp_pico();
    for (role, gpio) in CLAIMED {
        board.pins.check(role, gpio).unwrap();
    }
    for bit in 0..8u8 {
        board.pins.check(PinRole::PixelData(bit), CLAIMED_PIXEL_BASE + bit).unwrap();
    }
}

#[test]
fn pixel_bus_is_eight_consecutive_gpios() {
    let pins = BoardConfig::dlp_pico().pins;
    let gpios: Vec<u8> = (0..8).map(|bit| pins.gpio(PinRole::PixelData(bit)).unwrap()).collect();
    assert!(gpios.windows(2).all(|w| w[1] == w[0] + 1));
    assert!(*gpios.last().unwrap() < 30, "RP2040 has GPIO 0..=29");
    assert_eq!(pins.gpio(PinRole::PixelData(8)), None);
}

#[test]
fn swapped_sync_pins_are_rejected() {
    let pins = BoardConfig::dlp_pico().pins;
    assert_eq!(
        pins.check(PinRole::HSync, 17),
        Err(PinError::Mismatch { role: PinRole::HSync, expected: 19, claimed: 17 })
    );
}

#[test]
fn data_channel_is_paced_by_the_pixel_fifo() {
    assert_eq!(BoardConfig::dlp_pico().pixel_dreq, DREQ_PIO0_TX2);
}

#[test]
fn control_bus_clock_fits_standard_mode() {
    let hz = BoardConfig::dlp_pico().bus_frequency.get();
    assert!(hz > 0 && hz <= 100_000, "{hz} Hz");
}
