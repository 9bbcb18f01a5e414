//! Demo workloads for bring-up and focus checks.
//!
//! - [`checkerboard`]: grey blocks cycling through every level
//! - [`mandelbrot`]: fixed-point escape-time fractal with iteration banding
//! - [`show_test_lines`]: the controller's own fine-line pattern
//!
//! Drawing goes through `embedded-graphics`, so any `DrawTarget<Color = Gray8>`
//! works; the packed framebuffer quantizes to its bit width.

use embedded_graphics::pixelcolor::Gray8;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;
use platform::{ControlError, DlpcController, TestPattern};

/// Checkerboard block width in pixels.
pub const BLOCK_WIDTH: u32 = 160;
/// Checkerboard block height in pixels.
pub const BLOCK_HEIGHT: u32 = 80;
/// Grey levels the checkerboard cycles through.
pub const CHECKERBOARD_LEVELS: u32 = 4;

/// Luma of checkerboard block `(bx, by)`: level `(bx + by) mod 4`, spread over 0..=255.
pub fn checkerboard_luma(bx: u32, by: u32) -> u8 {
    const STEP: u32 = 255 / (CHECKERBOARD_LEVELS - 1);
    let level = bx.wrapping_add(by) % CHECKERBOARD_LEVELS;
    u8::try_from(level.saturating_mul(STEP)).unwrap_or(u8::MAX)
}

/// Fill `target` with [`BLOCK_WIDTH`] × [`BLOCK_HEIGHT`] grey blocks.
pub fn checkerboard<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Gray8> + OriginDimensions,
{
    let size = target.size();
    let block = Size::new(BLOCK_WIDTH, BLOCK_HEIGHT);
    for by in 0..size.height.div_ceil(BLOCK_HEIGHT) {
        for bx in 0..size.width.div_ceil(BLOCK_WIDTH) {
            let origin = Point::new(
                i32::try_from(bx.saturating_mul(BLOCK_WIDTH)).unwrap_or(i32::MAX),
                i32::try_from(by.saturating_mul(BLOCK_HEIGHT)).unwrap_or(i32::MAX),
            );
            Rectangle::new(origin, block)
                .into_styled(PrimitiveStyle::with_fill(Gray8::new(checkerboard_luma(bx, by))))
                .draw(target)?;
        }
    }
    Ok(())
}

// ── Mandelbrot ──────────────────────────────────────────────────────────────

/// Fixed point with 28 fractional bits (Q4.28).
pub type Fix28 = i32;

/// Fractional bits of [`Fix28`].
pub const FIX28_SHIFT: u32 = 28;
/// 1.0
pub const ONE: Fix28 = 1 << FIX28_SHIFT;
/// 4.0, the squared escape radius.
pub const FOUR: Fix28 = 0x4000_0000;

/// Iteration limit of the shipped demo.
pub const MAX_ITERATIONS: u32 = 1000;

/// Q4.28 product. Inputs inside the escape radius cannot overflow.
#[allow(clippy::arithmetic_side_effects)] // i32 × i32 fits i64; the shift is < 64
pub fn mul_fix28(a: Fix28, b: Fix28) -> Fix28 {
    ((i64::from(a) * i64::from(b)) >> FIX28_SHIFT) as Fix28
}

/// Iterations before `c` escapes, capped at `max`. `max` means "inside the set".
///
/// Intermediates are widened so an escaping orbit cannot wrap back inside.
#[allow(clippy::arithmetic_side_effects)] // |z| < 2 before each step bounds every term well inside i64
pub fn escape_count(c_re: Fix28, c_im: Fix28, max: u32) -> u32 {
    let (c_re, c_im) = (i64::from(c_re), i64::from(c_im));
    let four = i64::from(FOUR);
    let (mut z_re, mut z_im, mut re_sq, mut im_sq) = (0i64, 0i64, 0i64, 0i64);
    let mut count = 0;
    while count < max {
        count += 1;
        z_im = ((z_re * z_im) >> (FIX28_SHIFT - 1)) + c_im;
        z_re = re_sq - im_sq + c_re;
        re_sq = (z_re * z_re) >> FIX28_SHIFT;
        im_sq = (z_im * z_im) >> FIX28_SHIFT;
        if re_sq + im_sq >= four {
            break;
        }
    }
    count
}

/// Band of an escape count: 0 inside the set, then 7 for the slowest
/// escapes down to 1 for the fastest. Each band halves the count threshold.
pub fn band(count: u32, max: u32) -> u8 {
    if count >= max {
        return 0;
    }
    (1..=6u32)
        .find(|&shift| count >= max.checked_shr(shift).unwrap_or(0))
        .map_or(1, |shift| u8::try_from(8 - shift).unwrap_or(1))
}

/// Luma of a band, spread over 0..=255.
pub fn band_luma(band: u8) -> u8 {
    u8::try_from(u16::from(band.min(7)).saturating_mul(255) / 7).unwrap_or(u8::MAX)
}

/// Region of the complex plane mapped onto the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MandelbrotView {
    /// Real part at the left edge.
    pub re_min: Fix28,
    /// Real extent across the width.
    pub re_span: Fix28,
    /// Imaginary part at the top edge.
    pub im_max: Fix28,
    /// Imaginary extent down the height.
    pub im_span: Fix28,
    /// Iteration limit.
    pub max_iterations: u32,
}

impl MandelbrotView {
    /// Re in [-2, 1), Im in (-1, 1], 1000 iterations.
    pub const CLASSIC: Self =
        Self { re_min: -2 * ONE, re_span: 3 * ONE, im_max: ONE, im_span: 2 * ONE, max_iterations: MAX_ITERATIONS };

    /// Point of the plane under pixel `i` of `extent` along an axis.
    #[allow(clippy::arithmetic_side_effects)] // span × i / extent ≤ span for i < extent
    fn along(start: Fix28, span: Fix28, i: u32, extent: u32, sign: i64) -> Fix28 {
        let offset = i64::from(span) * i64::from(i) / i64::from(extent.max(1));
        (i64::from(start) + sign * offset) as Fix28
    }
}

impl Default for MandelbrotView {
    fn default() -> Self {
        Self::CLASSIC
    }
}

/// Render `view` over the whole target. Returns the total iteration count.
pub fn mandelbrot<D>(target: &mut D, view: &MandelbrotView) -> Result<u64, D::Error>
where
    D: DrawTarget<Color = Gray8> + OriginDimensions,
{
    let size = target.size();
    let mut total: u64 = 0;
    for y in 0..size.height {
        let c_im = MandelbrotView::along(view.im_max, view.im_span, y, size.height, -1);
        let row = (0..size.width).map(|x| {
            let c_re = MandelbrotView::along(view.re_min, view.re_span, x, size.width, 1);
            let count = escape_count(c_re, c_im, view.max_iterations);
            total = total.saturating_add(u64::from(count));
            let luma = band_luma(band(count, view.max_iterations));
            Pixel(
                Point::new(i32::try_from(x).unwrap_or(i32::MAX), i32::try_from(y).unwrap_or(i32::MAX)),
                Gray8::new(luma),
            )
        });
        target.draw_iter(row)?;
    }
    debug!("mandelbrot: {} iterations", total);
    Ok(total)
}

// ── Controller patterns ─────────────────────────────────────────────────────

/// Put the controller's fine-line test pattern on screen.
pub fn show_test_lines<I, PWR, RDY, D>(controller: &mut DlpcController<I, PWR, RDY, D>) -> Result<(), ControlError>
where
    I: I2c,
    PWR: OutputPin,
    RDY: InputPin,
    D: DelayNs,
{
    controller.enter_test_pattern(TestPattern::FINE_LINES)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;
    use platform::{Framebuffer, PixelFormat};

    #[test]
    fn checkerboard_cycles_four_levels() {
        let mut fb = Framebuffer::new(vec![0u8; 320 * 160 / 4], 320, 160, PixelFormat::GRAY2_MSB).unwrap();
        checkerboard(&mut fb).unwrap();
        assert_eq!(fb.pixel(0, 0), Some(0));
        assert_eq!(fb.pixel(159, 79), Some(0));
        assert_eq!(fb.pixel(160, 0), Some(1));
        assert_eq!(fb.pixel(0, 80), Some(1));
        assert_eq!(fb.pixel(160, 80), Some(2));
        assert_eq!(fb.pixel(319, 159), Some(2));
    }

    #[test]
    fn checkerboard_luma_wraps_after_four_blocks() {
        assert_eq!(checkerboard_luma(0, 0), 0);
        assert_eq!(checkerboard_luma(3, 0), 255);
        assert_eq!(checkerboard_luma(4, 0), 0);
        assert_eq!(checkerboard_luma(2, 3), 85);
    }

    #[test]
    fn fix28_constants() {
        assert_eq!(ONE, 0x1000_0000);
        assert_eq!(FOUR, 4 * ONE);
        assert_eq!(mul_fix28(2 * ONE, ONE / 2), ONE);
        assert_eq!(mul_fix28(-ONE, ONE / 4), -ONE / 4);
    }

    #[test]
    fn origin_is_inside_and_far_points_escape_at_once() {
        assert_eq!(escape_count(0, 0, MAX_ITERATIONS), MAX_ITERATIONS);
        assert_eq!(escape_count(-ONE, 0, MAX_ITERATIONS), MAX_ITERATIONS);
        assert_eq!(escape_count(-2 * ONE, ONE, MAX_ITERATIONS), 1);
        let slow = escape_count(ONE / 4 + ONE / 100, 0, MAX_ITERATIONS);
        assert!(slow > 10 && slow < MAX_ITERATIONS, "{slow}");
    }

    #[test]
    fn bands_halve_the_threshold() {
        assert_eq!(band(1000, 1000), 0);
        assert_eq!(band(500, 1000), 7);
        assert_eq!(band(250, 1000), 6);
        assert_eq!(band(125, 1000), 5);
        assert_eq!(band(62, 1000), 4);
        assert_eq!(band(31, 1000), 3);
        assert_eq!(band(15, 1000), 2);
        assert_eq!(band(14, 1000), 1);
        assert_eq!(band(1, 1000), 1);
        assert_eq!(band_luma(0), 0);
        assert_eq!(band_luma(7), 255);
    }

    #[test]
    fn mandelbrot_renders_set_dark_and_edges_lit() {
        let (w, h) = (48u32, 32u32);
        let mut fb = Framebuffer::new(vec![0u8; (w * h / 4) as usize], w, h, PixelFormat::GRAY2_MSB).unwrap();
        let total = mandelbrot(&mut fb, &MandelbrotView::CLASSIC).unwrap();
        // Pixel (32, 16) is c = 0 + 0i: inside the set.
        assert_eq!(fb.pixel(32, 16), Some(0));
        // Top-left corner, c = -2 + i, escapes on the first step.
        assert_eq!(fb.pixel(0, 0), Some(band_luma(1) >> 6));
        assert!(total >= u64::from(MAX_ITERATIONS));
    }
}
