//! RP2040 memory map and framebuffer budget.
//!
//! ## SRAM on RP2040
//!
//! | Region      | Base        | Size   | Notes |
//! |-------------|-------------|--------|-------|
//! | SRAM0-3     | 0x2000_0000 | 256 KB | word-striped across four banks |
//! | SRAM4       | 0x2004_0000 | 4 KB   | core 0 stack by default |
//! | SRAM5       | 0x2004_1000 | 4 KB   | core 1 stack by default |
//!
//! Every region is reachable by the DMA controller. The striped block is the
//! only one large enough for the framebuffer, which takes 230 400 of its
//! 262 144 bytes. Everything else (statics, heap, core 0 data) shares the
//! remaining 31 744 bytes.
//!
//! ## Usage
//! ```rust,ignore
//! use platform::dma_safety::FRAMEBUFFER_SIZE_BYTES;
//!
//! #[link_section = ".sram_striped"]
//! static mut FRAMEBUFFER: [u8; FRAMEBUFFER_SIZE_BYTES] = [0; FRAMEBUFFER_SIZE_BYTES];
//! ```

#![allow(clippy::arithmetic_side_effects)] // const address arithmetic, checked by the compiler

// ── Memory regions ───────────────────────────────────────────────────────────

/// Base of the striped SRAM0-3 block.
pub const SRAM_STRIPED_BASE: usize = 0x2000_0000;

/// Size of the striped block (256 KB).
pub const SRAM_STRIPED_SIZE_BYTES: usize = 256 * 1024;

/// Base of SRAM4.
pub const SRAM4_BASE: usize = 0x2004_0000;

/// Base of SRAM5.
pub const SRAM5_BASE: usize = 0x2004_1000;

/// Size of SRAM4 and of SRAM5 (4 KB each).
pub const SRAM_SCRATCH_SIZE_BYTES: usize = 4 * 1024;

/// End of SRAM (exclusive).
pub const SRAM_END: usize = SRAM5_BASE + SRAM_SCRATCH_SIZE_BYTES;

// ── Framebuffer ──────────────────────────────────────────────────────────────

/// Scan-out width in pixels.
pub const FRAME_WIDTH: u32 = 1280;

/// Scan-out height in lines.
pub const FRAME_HEIGHT: u32 = 720;

/// Bits per pixel on the parallel port.
pub const FRAME_BITS_PER_PIXEL: usize = 2;

/// Framebuffer size: 1280 × 720 × 2 bits / 8 = 230 400 bytes.
///
/// This is also the data channel's transfer count per loop cycle.
pub const FRAMEBUFFER_SIZE_BYTES: usize =
    FRAME_WIDTH as usize * FRAME_HEIGHT as usize * FRAME_BITS_PER_PIXEL / 8;

/// Striped SRAM left after the framebuffer.
pub const SRAM_HEADROOM_BYTES: usize = SRAM_STRIPED_SIZE_BYTES - FRAMEBUFFER_SIZE_BYTES;

const _: () = assert!(FRAMEBUFFER_SIZE_BYTES <= SRAM_STRIPED_SIZE_BYTES);

/// True when `len` bytes at `addr` lie entirely inside RP2040 SRAM.
///
/// Host builds place the framebuffer on the heap, so this is false there.
pub fn in_sram(addr: usize, len: usize) -> bool {
    match addr.checked_add(len) {
        Some(end) => addr >= SRAM_STRIPED_BASE && end <= SRAM_END,
        None => false,
    }
}
