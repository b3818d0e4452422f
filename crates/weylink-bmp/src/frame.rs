//! Decoded BGRA frame buffer.

use crate::error::BmpError;

/// A decoded image: 4 bytes per pixel in B, G, R, A order, rows top to
/// bottom.
#[derive(Clone, PartialEq, Eq)]
pub struct BgraFrame {
    pix: Vec<u8>,
    stride: usize,
    width: u32,
    height: u32,
}

impl BgraFrame {
    /// Allocate a zeroed frame.
    pub fn new(width: u32, height: u32) -> Self {
        let stride = width as usize * 4;
        Self {
            pix: vec![0; stride * height as usize],
            stride,
            width,
            height,
        }
    }

    /// Allocate a zeroed frame, failing if its size overflows `usize`.
    pub fn try_new(width: u32, height: u32) -> Result<Self, BmpError> {
        let len = (width as usize)
            .checked_mul(4)
            .and_then(|stride| stride.checked_mul(height as usize))
            .ok_or_else(|| {
                BmpError::UnsupportedFormat(format!("{width}x{height} frame is too large"))
            })?;
        Ok(Self {
            pix: vec![0; len],
            stride: width as usize * 4,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pix
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pix
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pix
    }

    /// Row `y`, counted from the top.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.pix[start..start + self.stride]
    }

    /// Raw BGRA bytes of the pixel at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = y as usize * self.stride + x as usize * 4;
        [self.pix[i], self.pix[i + 1], self.pix[i + 2], self.pix[i + 3]]
    }

    /// The pixel at (`x`, `y`) as `[r, g, b, a]`.
    pub fn rgba(&self, x: u32, y: u32) -> [u8; 4] {
        let [b, g, r, a] = self.pixel(x, y);
        [r, g, b, a]
    }
}

impl std::fmt::Debug for BgraFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BgraFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}
