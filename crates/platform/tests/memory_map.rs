//! Architecture tests: framebuffer placement in RP2040 SRAM.

// Test files legitimately use arithmetic for verification; allow at file level.
#![allow(clippy::arithmetic_side_effects)]
// Some assertions check documented compile-time constants for architectural correctness.
#![allow(clippy::assertions_on_constants)]

use platform::dma_safety::{
    in_sram, FRAMEBUFFER_SIZE_BYTES, FRAME_HEIGHT, FRAME_WIDTH, SRAM_END, SRAM_HEADROOM_BYTES,
    SRAM_STRIPED_BASE, SRAM_STRIPED_SIZE_BYTES,
};
use platform::{BoardConfig, PixelFormat};

#[test]
fn framebuffer_size_matches_dimensions() {
    // 2bpp = 4 pixels per byte
    let expected = (FRAME_WIDTH as usize * FRAME_HEIGHT as usize) / 4;
    assert_eq!(FRAMEBUFFER_SIZE_BYTES, expected);
    assert_eq!(FRAMEBUFFER_SIZE_BYTES, 230_400);
}

#[test]
fn framebuffer_fits_in_striped_sram_with_headroom() {
    assert!(FRAMEBUFFER_SIZE_BYTES <= SRAM_STRIPED_SIZE_BYTES);
    assert_eq!(SRAM_HEADROOM_BYTES, 31_744);
}

#[test]
fn board_config_agrees_with_the_memory_map() {
    let cfg = BoardConfig::dlp_pico();
    assert_eq!(cfg.framebuffer_len(), FRAMEBUFFER_SIZE_BYTES);
    assert_eq!(cfg.pixel_format, PixelFormat::GRAY2_MSB);
    assert_eq!((cfg.width, cfg.height), (FRAME_WIDTH, FRAME_HEIGHT));
}

#[test]
fn sram_bounds() {
    assert!(in_sram(SRAM_STRIPED_BASE, FRAMEBUFFER_SIZE_BYTES));
    assert!(in_sram(SRAM_END - 1, 1));
    assert!(!in_sram(SRAM_END - 1, 2));
    assert!(!in_sram(SRAM_STRIPED_BASE - 1, 1));
    assert!(!in_sram(usize::MAX, 2));
}
