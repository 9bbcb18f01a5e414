//! Packed framebuffer scanned out by the transfer engine.
//!
//! Pixels are `B` bits wide (1, 2 or 8) and packed `8 / B` to a byte, row
//! major. Within a byte the first pixel sits in the high bits (MSB-first,
//! the scan-out layout) or in the low bits (LSB-first, the offline image
//! packer's layout).
//!
//! # OR-merge writes
//!
//! [`Framebuffer::set_pixel`] ORs the shifted brightness into its byte. It
//! never clears bits, so redrawing a pixel with a darker value has no effect
//! until the buffer is cleared. Brightness is shifted, not masked: a value
//! wider than `B` bits spills into the neighbouring pixel in the same byte.
//!
//! Packed formats do not clamp coordinates: an `x` past the row end lands in
//! the next row, and only an index past the buffer is rejected. The 8-bit
//! format clamps to the last row and column instead.
//!
//! # Memory
//!
//! 1280×720 at 2 bpp is 230 400 bytes, most of the RP2040's SRAM. The buffer
//! is borrowed (`B: AsRef<[u8]> + AsMut<[u8]>`) so it can live in a static.

// Index math is bounded by the buffer length checks; shifts are < 8 and the
// truncating shift is the documented spill behaviour.
#![allow(
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
)]

use embedded_graphics::pixelcolor::{Gray8, GrayColor};
use embedded_graphics::prelude::*;
use thiserror_no_std::Error;

/// Bits per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitsPerPixel {
    /// Binary; 8 pixels per byte.
    One,
    /// Four grey levels; 4 pixels per byte.
    Two,
    /// One byte per pixel.
    Eight,
}

impl BitsPerPixel {
    /// Width of one pixel in bits.
    pub const fn bits(self) -> u32 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Eight => 8,
        }
    }

    /// Pixels sharing one byte.
    pub const fn pixels_per_byte(self) -> usize {
        match self {
            Self::One => 8,
            Self::Two => 4,
            Self::Eight => 1,
        }
    }

    /// Largest in-range brightness.
    pub const fn max_value(self) -> u8 {
        match self {
            Self::One => 0x01,
            Self::Two => 0x03,
            Self::Eight => 0xFF,
        }
    }

    /// Keep the top `bits()` bits of an 8-bit luma.
    pub const fn quantize(self, luma: u8) -> u8 {
        luma >> (8 - self.bits())
    }
}

/// Position of the first pixel within a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    /// First pixel in the most significant bits.
    MsbFirst,
    /// First pixel in the least significant bits.
    LsbFirst,
}

/// Pixel width and in-byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PixelFormat {
    /// Bits per pixel.
    pub bpp: BitsPerPixel,
    /// In-byte order.
    pub order: BitOrder,
}

impl PixelFormat {
    /// Scan-out format of the shipped board.
    pub const GRAY2_MSB: Self = Self { bpp: BitsPerPixel::Two, order: BitOrder::MsbFirst };
    /// Layout produced by the offline TIFF packer.
    pub const MONO_LSB: Self = Self { bpp: BitsPerPixel::One, order: BitOrder::LsbFirst };
    /// Byte per pixel.
    pub const GRAY8: Self = Self { bpp: BitsPerPixel::Eight, order: BitOrder::MsbFirst };

    /// Bytes needed for `width × height` pixels, rounded up.
    pub const fn buffer_len(self, width: u32, height: u32) -> usize {
        let bits = width as usize * height as usize * self.bpp.bits() as usize;
        bits.div_ceil(8)
    }

    /// Bit offset of pixel number `index` inside its byte.
    pub const fn shift(self, index: usize) -> u32 {
        let ppb = self.bpp.pixels_per_byte();
        let slot = (index % ppb) as u32;
        match self.order {
            BitOrder::MsbFirst => (ppb as u32 - 1 - slot) * self.bpp.bits(),
            BitOrder::LsbFirst => slot * self.bpp.bits(),
        }
    }
}

/// Framebuffer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FramebufferError {
    /// Backing storage is shorter than the geometry needs.
    #[error("buffer holds {actual} bytes, {required} required")]
    BufferTooSmall {
        /// Bytes the geometry needs.
        required: usize,
        /// Bytes supplied.
        actual: usize,
    },
    /// Pixel index lands past the end of the buffer.
    #[error("pixel ({x}, {y}) is outside the buffer")]
    OutOfBounds {
        /// Column.
        x: u32,
        /// Row.
        y: u32,
    },
    /// A pre-packed image does not match the buffer size.
    #[error("image is {actual} bytes, buffer is {expected}")]
    ImageSizeMismatch {
        /// Buffer length.
        expected: usize,
        /// Image length.
        actual: usize,
    },
}

/// Packed framebuffer over borrowed or owned storage.
pub struct Framebuffer<B> {
    buf: B,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Framebuffer<B> {
    /// Wrap `buf`. Only the first [`PixelFormat::buffer_len`] bytes are used.
    pub fn new(buf: B, width: u32, height: u32, format: PixelFormat) -> Result<Self, FramebufferError> {
        let required = format.buffer_len(width, height);
        let actual = buf.as_ref().len();
        if actual < required {
            return Err(FramebufferError::BufferTooSmall { required, actual });
        }
        Ok(Self { buf, width, height, format })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel format.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes scanned out per frame.
    pub fn len(&self) -> usize {
        self.format.buffer_len(self.width, self.height)
    }

    /// True for a zero-sized geometry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Packed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.len();
        self.buf.as_ref().get(..len).unwrap_or(&[])
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len();
        self.buf.as_mut().get_mut(..len).unwrap_or(&mut [])
    }

    /// Address of the first byte, for the transfer engine's re-arm pointer.
    pub fn origin_address(&self) -> usize {
        self.buf.as_ref().as_ptr() as usize
    }

    /// Zero every byte.
    pub fn clear(&mut self) {
        self.bytes_mut().fill(0);
    }

    /// OR `brightness` into pixel `(x, y)`.
    ///
    /// Packed formats: no clamping or masking (see module docs). 8-bit:
    /// coordinates clamp to the last column and row.
    pub fn set_pixel(&mut self, x: u32, y: u32, brightness: u8) -> Result<(), FramebufferError> {
        let (x, y) = match self.format.bpp {
            BitsPerPixel::Eight => {
                if self.width == 0 || self.height == 0 {
                    return Err(FramebufferError::OutOfBounds { x, y });
                }
                (x.min(self.width - 1), y.min(self.height - 1))
            }
            BitsPerPixel::One | BitsPerPixel::Two => (x, y),
        };
        let index = (y as usize)
            .checked_mul(self.width as usize)
            .and_then(|row| row.checked_add(x as usize))
            .ok_or(FramebufferError::OutOfBounds { x, y })?;
        let format = self.format;
        let byte = self
            .bytes_mut()
            .get_mut(index / format.bpp.pixels_per_byte())
            .ok_or(FramebufferError::OutOfBounds { x, y })?;
        *byte |= brightness.wrapping_shl(format.shift(index));
        Ok(())
    }

    /// Decode pixel `(x, y)`. `None` outside the geometry.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = y as usize * self.width as usize + x as usize;
        let byte = *self.as_bytes().get(index / self.format.bpp.pixels_per_byte())?;
        Some((byte >> self.format.shift(index)) & self.format.bpp.max_value())
    }

    /// Replace the contents with an image already packed in this format.
    pub fn load_packed(&mut self, image: &[u8]) -> Result<(), FramebufferError> {
        let expected = self.len();
        if image.len() != expected {
            return Err(FramebufferError::ImageSizeMismatch { expected, actual: image.len() });
        }
        self.bytes_mut().copy_from_slice(image);
        Ok(())
    }

    /// Draw an 8-bit grayscale image at the origin: pixels at or above
    /// `threshold` get full brightness, the rest are left untouched.
    ///
    /// The source is clipped to the framebuffer. Returns the number of lit pixels.
    pub fn blit_gray8_threshold(
        &mut self,
        src: &[u8],
        src_width: u32,
        threshold: u8,
    ) -> Result<usize, FramebufferError> {
        if src_width == 0 || src.len() % src_width as usize != 0 {
            return Err(FramebufferError::ImageSizeMismatch {
                expected: src_width as usize,
                actual: src.len(),
            });
        }
        let lit = self.format.bpp.max_value();
        let mut count = 0;
        for (y, row) in (0..self.height).zip(src.chunks_exact(src_width as usize)) {
            for (x, &v) in (0..self.width).zip(row.iter()) {
                if v >= threshold {
                    self.set_pixel(x, y, lit)?;
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> OriginDimensions for Framebuffer<B> {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Gray8 colours are quantized to the packed width and OR-merged.
/// Points outside the framebuffer are discarded.
impl<B: AsRef<[u8]> + AsMut<[u8]>> DrawTarget for Framebuffer<B> {
    type Color = Gray8;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let bpp = self.format.bpp;
        for Pixel(point, color) in pixels {
            let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) else {
                continue;
            };
            if x < self.width && y < self.height {
                // In bounds by the check above.
                let _ = self.set_pixel(x, y, bpp.quantize(color.luma()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};

    fn fb2(w: u32, h: u32) -> Framebuffer<std::vec::Vec<u8>> {
        let len = PixelFormat::GRAY2_MSB.buffer_len(w, h);
        Framebuffer::new(vec![0u8; len], w, h, PixelFormat::GRAY2_MSB).unwrap()
    }

    #[test]
    fn shipped_geometry_is_230400_bytes() {
        assert_eq!(PixelFormat::GRAY2_MSB.buffer_len(1280, 720), 230_400);
        assert_eq!(PixelFormat::MONO_LSB.buffer_len(720, 1280), 115_200);
        assert_eq!(PixelFormat::MONO_LSB.buffer_len(3, 3), 2);
    }

    #[test]
    fn msb_first_two_bit_shifts() {
        let f = PixelFormat::GRAY2_MSB;
        assert_eq!([f.shift(0), f.shift(1), f.shift(2), f.shift(3), f.shift(4)], [6, 4, 2, 0, 6]);
    }

    #[test]
    fn lsb_first_one_bit_shifts() {
        let f = PixelFormat::MONO_LSB;
        assert_eq!((0..9).map(|i| f.shift(i)).collect::<std::vec::Vec<_>>(), [0, 1, 2, 3, 4, 5, 6, 7, 0]);
    }

    #[test]
    fn set_pixel_packs_msb_first() {
        let mut fb = fb2(8, 1);
        fb.set_pixel(0, 0, 3).unwrap();
        fb.set_pixel(3, 0, 1).unwrap();
        fb.set_pixel(5, 0, 2).unwrap();
        assert_eq!(fb.as_bytes(), &[0b1100_0001, 0b0010_0000]);
        assert_eq!(fb.pixel(5, 0), Some(2));
    }

    #[test]
    fn writes_or_merge_and_do_not_overwrite() {
        let mut fb = fb2(4, 1);
        fb.set_pixel(1, 0, 1).unwrap();
        fb.set_pixel(1, 0, 2).unwrap();
        assert_eq!(fb.pixel(1, 0), Some(3));
        fb.clear();
        assert_eq!(fb.as_bytes(), &[0]);
    }

    #[test]
    fn out_of_range_brightness_spills_into_neighbour() {
        let mut fb = fb2(4, 1);
        fb.set_pixel(1, 0, 0b111).unwrap();
        assert_eq!(fb.pixel(0, 0), Some(0b01));
        assert_eq!(fb.pixel(1, 0), Some(0b11));
    }

    #[test]
    fn packed_x_overflow_wraps_to_next_row_and_past_end_is_rejected() {
        let mut fb = fb2(4, 2);
        fb.set_pixel(5, 0, 3).unwrap();
        assert_eq!(fb.pixel(1, 1), Some(3));
        assert_eq!(fb.set_pixel(0, 2, 1), Err(FramebufferError::OutOfBounds { x: 0, y: 2 }));
    }

    #[test]
    fn eight_bit_clamps_to_bounds() {
        let mut fb = Framebuffer::new(vec![0u8; 6], 3, 2, PixelFormat::GRAY8).unwrap();
        fb.set_pixel(10, 10, 0x42).unwrap();
        assert_eq!(fb.pixel(2, 1), Some(0x42));
        assert_eq!(fb.as_bytes(), &[0, 0, 0, 0, 0, 0x42]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let err = Framebuffer::new([0u8; 3], 4, 4, PixelFormat::GRAY2_MSB).err();
        assert_eq!(err, Some(FramebufferError::BufferTooSmall { required: 4, actual: 3 }));
    }

    #[test]
    fn load_packed_requires_exact_size() {
        let mut fb = Framebuffer::new(vec![0u8; 2], 4, 4, PixelFormat::MONO_LSB).unwrap();
        assert_eq!(
            fb.load_packed(&[1, 2, 3]),
            Err(FramebufferError::ImageSizeMismatch { expected: 2, actual: 3 })
        );
        fb.load_packed(&[0b0000_0001, 0b1000_0000]).unwrap();
        assert_eq!(fb.pixel(0, 0), Some(1));
        assert_eq!(fb.pixel(3, 3), Some(1));
    }

    #[test]
    fn threshold_blit_lights_bright_source_pixels() {
        let mut fb = fb2(4, 2);
        let src = [0, 200, 10, 255, 128, 127];
        let lit = fb.blit_gray8_threshold(&src, 3, 128).unwrap();
        assert_eq!(lit, 3);
        assert_eq!(fb.pixel(1, 0), Some(3));
        assert_eq!(fb.pixel(0, 1), Some(3));
        assert_eq!(fb.pixel(1, 1), Some(3));
        assert_eq!(fb.pixel(2, 1), Some(0));
    }

    #[test]
    fn draw_target_quantizes_and_clips() {
        let mut fb = fb2(8, 4);
        Rectangle::new(Point::new(-2, -2), Size::new(4, 4))
            .into_styled(PrimitiveStyle::with_fill(Gray8::new(0x80)))
            .draw(&mut fb)
            .unwrap();
        assert_eq!(fb.pixel(0, 0), Some(2));
        assert_eq!(fb.pixel(1, 1), Some(2));
        assert_eq!(fb.pixel(2, 0), Some(0));
        assert_eq!(fb.size(), Size::new(8, 4));
    }
}
