use std::convert::Infallible;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;

/// A monochrome canvas. `BinaryColor::On` is ink, `BinaryColor::Off` is paper.
///
/// Pixels are packed eight to a byte, most significant bit first, with each row starting
/// on a fresh byte. A set bit is paper, so a new frame is all `0xFF`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayFrame {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl DisplayFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            buffer: vec![0xFF; Self::stride_for(width) * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        Self::stride_for(self.width)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..]
    }

    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        match self.locate(x as i32, y as i32) {
            Some((index, mask)) => self.buffer[index] & mask == 0,
            None => false,
        }
    }

    pub fn ink_count(&self) -> usize {
        (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .filter(|&(x, y)| self.is_ink(x, y))
            .count()
    }

    fn set(&mut self, x: i32, y: i32, ink: bool) {
        if let Some((index, mask)) = self.locate(x, y) {
            if ink {
                self.buffer[index] &= !mask;
            } else {
                self.buffer[index] |= mask;
            }
        }
    }

    fn locate(&self, x: i32, y: i32) -> Option<(usize, u8)> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        let index = y as usize * self.stride() + x as usize / 8;
        Some((index, 0x80 >> (x as usize % 8)))
    }

    fn stride_for(width: u32) -> usize {
        (width as usize + 7) / 8
    }
}

impl OriginDimensions for DisplayFrame {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for DisplayFrame {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        // Anything outside the canvas is dropped rather than wrapped.
        for Pixel(point, color) in pixels {
            self.set(point.x, point.y, color.is_on());
        }
        Ok(())
    }
}
