//! File header and DIB header parsing.
//!
//! Only BITMAPINFOHEADER (40 bytes), BITMAPV4HEADER (108) and
//! BITMAPV5HEADER (124) are accepted, with one colour plane and no
//! compression. `BI_BITFIELDS` counts as uncompressed when a V4/V5 header
//! carries the default masks.

use crate::error::BmpError;

const FILE_HEADER_LEN: usize = 14;
const INFO_HEADER_LEN: u32 = 40;
const V4_HEADER_LEN: u32 = 108;
const V5_HEADER_LEN: u32 = 124;
const PALETTE_LEN: usize = 256 * 4;

const BI_RGB: u32 = 0;
const BI_BITFIELDS: u32 = 3;
/// Red, green, blue and alpha masks equivalent to `BI_RGB` at 32 bpp.
const DEFAULT_MASKS: [u32; 4] = [0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0xFF00_0000];

/// Pixel storage of the source rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// One palette index per pixel.
    Indexed8,
    /// B, G, R.
    Bgr24,
    /// B, G, R, A (or X).
    Bgra32,
}

impl PixelFormat {
    pub fn bits_per_pixel(self) -> u16 {
        match self {
            Self::Indexed8 => 8,
            Self::Bgr24 => 24,
            Self::Bgra32 => 32,
        }
    }

    /// Bytes per source row, padded to a 4-byte boundary.
    pub fn row_len(self, width: u32) -> usize {
        (width as usize * usize::from(self.bits_per_pixel())).div_ceil(32) * 4
    }
}

/// Geometry and layout of a BMP image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapHeader {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Rows are stored top row first (negative height on disk).
    pub top_down: bool,
    /// The alpha channel is meaningful. Only 32 bpp with a V4/V5 header.
    pub allow_alpha: bool,
    pub dib_len: u32,
    /// Offset of the first pixel row from the start of the file.
    pub pixel_offset: usize,
    /// BGRA palette entries for 8 bpp images, alpha forced opaque.
    pub palette: Vec<[u8; 4]>,
}

impl BitmapHeader {
    pub fn bits_per_pixel(&self) -> u16 {
        self.format.bits_per_pixel()
    }

    /// Bytes per source row, including padding.
    pub fn row_len(&self) -> usize {
        self.format.row_len(self.width)
    }

    /// Total file length the pixel data requires.
    pub fn required_len(&self) -> Result<usize, BmpError> {
        self.row_len()
            .checked_mul(self.height as usize)
            .and_then(|n| n.checked_add(self.pixel_offset))
            .ok_or_else(|| {
                BmpError::UnsupportedFormat(format!(
                    "{}x{} image is too large",
                    self.width, self.height
                ))
            })
    }
}

fn u16_at(src: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([src[at], src[at + 1]])
}

fn u32_at(src: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]])
}

fn i32_at(src: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]])
}

fn ensure_len(src: &[u8], needed: usize) -> Result<(), BmpError> {
    if src.len() < needed {
        return Err(BmpError::Truncated {
            needed,
            available: src.len(),
        });
    }
    Ok(())
}

fn unsupported(what: impl Into<String>) -> BmpError {
    BmpError::UnsupportedFormat(what.into())
}

/// Parse the headers at the start of `src`.
pub fn decode_header(src: &[u8]) -> Result<BitmapHeader, BmpError> {
    ensure_len(src, FILE_HEADER_LEN + 4)?;
    if &src[..2] != b"BM" {
        return Err(BmpError::InvalidMagic);
    }
    let offset = u32_at(src, 10) as usize;
    let dib_len = u32_at(src, 14);
    if !matches!(dib_len, INFO_HEADER_LEN | V4_HEADER_LEN | V5_HEADER_LEN) {
        return Err(unsupported(format!("DIB header length {dib_len}")));
    }
    let headers_end = FILE_HEADER_LEN + dib_len as usize;
    ensure_len(src, headers_end)?;

    let width = i32_at(src, 18);
    let raw_height = i32_at(src, 22);
    if width < 0 {
        return Err(unsupported(format!("negative width {width}")));
    }
    let top_down = raw_height < 0;
    let height = raw_height.unsigned_abs();
    let width = width.unsigned_abs();

    let planes = u16_at(src, 26);
    let bpp = u16_at(src, 28);
    let mut compression = u32_at(src, 30);
    if compression == BI_BITFIELDS && dib_len > INFO_HEADER_LEN {
        let masks = [
            u32_at(src, 54),
            u32_at(src, 58),
            u32_at(src, 62),
            u32_at(src, 66),
        ];
        if masks == DEFAULT_MASKS {
            compression = BI_RGB;
        }
    }
    if planes != 1 {
        return Err(unsupported(format!("{planes} colour planes")));
    }
    if compression != BI_RGB {
        return Err(unsupported(format!("compression {compression}")));
    }

    let (format, pixel_offset, palette) = match bpp {
        8 => {
            let palette_end = headers_end + PALETTE_LEN;
            if offset != palette_end {
                return Err(unsupported(format!("8 bpp pixel offset {offset}")));
            }
            ensure_len(src, palette_end)?;
            let palette = src[headers_end..palette_end]
                .chunks_exact(4)
                .map(|bgrx| [bgrx[0], bgrx[1], bgrx[2], 0xFF])
                .collect();
            (PixelFormat::Indexed8, offset, palette)
        }
        24 | 32 => {
            if offset != headers_end {
                return Err(unsupported(format!("{bpp} bpp pixel offset {offset}")));
            }
            let format = if bpp == 24 {
                PixelFormat::Bgr24
            } else {
                PixelFormat::Bgra32
            };
            (format, offset, Vec::new())
        }
        other => return Err(unsupported(format!("{other} bits per pixel"))),
    };

    Ok(BitmapHeader {
        width,
        height,
        format,
        top_down,
        allow_alpha: format == PixelFormat::Bgra32 && dib_len > INFO_HEADER_LEN,
        dib_len,
        pixel_offset,
        palette,
    })
}
