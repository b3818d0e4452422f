//! Pixel decoding with a cached header.

use tracing::debug;

use crate::error::BmpError;
use crate::frame::BgraFrame;
use crate::header::{decode_header, BitmapHeader, PixelFormat};

/// Decodes successive frames of one BMP stream.
///
/// The header of the first successful decode is kept and reused for every
/// later frame, which must have the same geometry. Call
/// [`reset`](Self::reset) when the stream changes.
#[derive(Debug, Default)]
pub struct BmpDecoder {
    cached: Option<BitmapHeader>,
}

impl BmpDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached header, if a frame has been decoded.
    pub fn header(&self) -> Option<&BitmapHeader> {
        self.cached.as_ref()
    }

    /// Forget the cached header.
    pub fn reset(&mut self) {
        self.cached = None;
    }

    /// Decode `src`, reusing `dst` when given and allocating otherwise.
    pub fn decode(&mut self, src: &[u8], dst: Option<BgraFrame>) -> Result<BgraFrame, BmpError> {
        let header = self.cached_header(src)?;
        let (width, height) = (header.width, header.height);
        let needed = header.required_len()?;
        // The source must cover the declared geometry before a buffer is sized from it.
        if src.len() < needed {
            return Err(BmpError::Truncated {
                needed,
                available: src.len(),
            });
        }
        let mut frame = match dst {
            Some(frame) => frame,
            None => BgraFrame::try_new(width, height)?,
        };
        self.decode_into(src, &mut frame)?;
        Ok(frame)
    }

    /// Decode `src` into `dst`, which must match the image size.
    pub fn decode_into(&mut self, src: &[u8], dst: &mut BgraFrame) -> Result<(), BmpError> {
        let header = self.cached_header(src)?;
        if header.width != dst.width() || header.height != dst.height() {
            return Err(BmpError::SizeMismatch {
                width: header.width,
                height: header.height,
                expected_width: dst.width(),
                expected_height: dst.height(),
            });
        }

        let needed = header.required_len()?;
        if src.len() < needed {
            return Err(BmpError::Truncated {
                needed,
                available: src.len(),
            });
        }

        let row_len = header.row_len();
        if row_len == 0 {
            return Ok(());
        }
        let stride = dst.stride();
        let height = header.height as usize;
        let pixels = &src[header.pixel_offset..needed];
        let out = dst.pixels_mut();
        for (i, src_row) in pixels.chunks_exact(row_len).enumerate() {
            // Bottom-up files store the visually last row first.
            let y = if header.top_down { i } else { height - 1 - i };
            let dst_row = &mut out[y * stride..(y + 1) * stride];
            convert_row(header, src_row, dst_row);
        }
        Ok(())
    }

    fn cached_header(&mut self, src: &[u8]) -> Result<&BitmapHeader, BmpError> {
        let header = match self.cached.take() {
            Some(header) => header,
            None => {
                let header = decode_header(src)?;
                debug!(
                    width = header.width,
                    height = header.height,
                    bpp = header.bits_per_pixel(),
                    top_down = header.top_down,
                    "decoded BMP header"
                );
                header
            }
        };
        Ok(self.cached.insert(header))
    }
}

fn convert_row(header: &BitmapHeader, src: &[u8], dst: &mut [u8]) {
    match header.format {
        PixelFormat::Indexed8 => {
            for (px, &index) in dst.chunks_exact_mut(4).zip(src) {
                px.copy_from_slice(&header.palette[usize::from(index)]);
            }
        }
        PixelFormat::Bgr24 => {
            for (px, bgr) in dst.chunks_exact_mut(4).zip(src.chunks_exact(3)) {
                px[..3].copy_from_slice(bgr);
                px[3] = 0xFF;
            }
        }
        PixelFormat::Bgra32 => {
            let len = dst.len();
            dst.copy_from_slice(&src[..len]);
            if !header.allow_alpha {
                for px in dst.chunks_exact_mut(4) {
                    px[3] = 0xFF;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a BMP file. `rows` are in storage order and unpadded.
    fn bmp(
        dib_len: u32,
        width: i32,
        height: i32,
        bpp: u16,
        palette: &[[u8; 4]],
        rows: &[&[u8]],
    ) -> Vec<u8> {
        let headers_end = 14 + dib_len;
        let offset = if bpp == 8 { headers_end + 1024 } else { headers_end };
        let mut out = Vec::new();
        out.extend_from_slice(b"BM");
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&dib_len.to_le_bytes());
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&bpp.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.resize(headers_end as usize, 0);
        if bpp == 8 {
            for entry in palette {
                out.extend_from_slice(entry);
            }
            out.resize(offset as usize, 0);
        }
        for row in rows {
            out.extend_from_slice(row);
            while (out.len() - offset as usize) % 4 != 0 {
                out.push(0);
            }
        }
        out
    }

    #[test]
    fn bottom_up_24bpp_flips_rows() {
        // Storage order: bottom row first.
        let bottom: &[u8] = &[1, 2, 3, 4, 5, 6];
        let top: &[u8] = &[7, 8, 9, 10, 11, 12];
        let src = bmp(40, 2, 2, 24, &[], &[bottom, top]);

        let frame = BmpDecoder::new().decode(&src, None).unwrap();
        assert_eq!((frame.width(), frame.height()), (2, 2));
        assert_eq!(frame.row(0), &[7, 8, 9, 0xFF, 10, 11, 12, 0xFF]);
        assert_eq!(frame.row(1), &[1, 2, 3, 0xFF, 4, 5, 6, 0xFF]);
        assert!(frame.pixels().chunks_exact(4).all(|px| px[3] == 0xFF));
    }

    #[test]
    fn indexed_pixel_expands_through_palette() {
        let src = bmp(40, 1, 1, 8, &[[10, 20, 30, 0]], &[&[0]]);
        let frame = BmpDecoder::new().decode(&src, None).unwrap();
        assert_eq!(frame.rgba(0, 0), [30, 20, 10, 255]);
    }

    #[test]
    fn top_down_keeps_row_order() {
        let first: &[u8] = &[1, 1, 1, 1];
        let second: &[u8] = &[2, 2, 2, 2];
        let third: &[u8] = &[3, 3, 3, 3];
        let src = bmp(108, 1, -3, 32, &[], &[first, second, third]);

        let frame = BmpDecoder::new().decode(&src, None).unwrap();
        assert_eq!(frame.row(0), first);
        assert_eq!(frame.row(1), second);
        assert_eq!(frame.row(2), third);
    }

    #[test]
    fn base_header_forces_opaque_alpha() {
        let row: &[u8] = &[10, 20, 30, 0x40];
        let opaque = BmpDecoder::new()
            .decode(&bmp(40, 1, 1, 32, &[], &[row]), None)
            .unwrap();
        assert_eq!(opaque.pixel(0, 0), [10, 20, 30, 0xFF]);

        let translucent = BmpDecoder::new()
            .decode(&bmp(124, 1, 1, 32, &[], &[row]), None)
            .unwrap();
        assert_eq!(translucent.pixel(0, 0), [10, 20, 30, 0x40]);
    }

    #[test]
    fn padded_rows_are_skipped() {
        // 3 px * 3 bytes = 9, padded to 12 per row.
        let bottom: &[u8] = &[0, 0, 1, 0, 0, 2, 0, 0, 3];
        let top: &[u8] = &[0, 0, 4, 0, 0, 5, 0, 0, 6];
        let src = bmp(40, 3, 2, 24, &[], &[bottom, top]);
        assert_eq!(src.len(), 54 + 24);

        let frame = BmpDecoder::new().decode(&src, None).unwrap();
        assert_eq!(frame.rgba(2, 0), [6, 0, 0, 0xFF]);
        assert_eq!(frame.rgba(0, 1), [1, 0, 0, 0xFF]);
    }

    #[test]
    fn header_is_cached_and_buffer_reused() {
        let mut decoder = BmpDecoder::new();
        let first = bmp(40, 1, 1, 24, &[], &[&[1, 2, 3]]);
        let second = bmp(40, 1, 1, 24, &[], &[&[4, 5, 6]]);

        let frame = decoder.decode(&first, None).unwrap();
        assert!(decoder.header().is_some());
        let frame = decoder.decode(&second, Some(frame)).unwrap();
        assert_eq!(frame.pixel(0, 0), [4, 5, 6, 0xFF]);
    }

    #[test]
    fn cached_geometry_wins_until_reset() {
        let mut decoder = BmpDecoder::new();
        decoder
            .decode(&bmp(40, 1, 1, 24, &[], &[&[1, 2, 3]]), None)
            .unwrap();

        let wider = bmp(40, 2, 1, 24, &[], &[&[1, 2, 3, 4, 5, 6]]);
        let mut dst = BgraFrame::new(2, 1);
        assert_eq!(
            decoder.decode_into(&wider, &mut dst),
            Err(BmpError::SizeMismatch {
                width: 1,
                height: 1,
                expected_width: 2,
                expected_height: 1,
            })
        );

        decoder.reset();
        decoder.decode_into(&wider, &mut dst).unwrap();
        assert_eq!(dst.pixel(1, 0), [4, 5, 6, 0xFF]);
    }

    #[test]
    fn size_mismatch_with_supplied_buffer() {
        let src = bmp(40, 2, 2, 24, &[], &[&[0; 6], &[0; 6]]);
        let err = BmpDecoder::new()
            .decode(&src, Some(BgraFrame::new(3, 2)))
            .unwrap_err();
        assert!(matches!(err, BmpError::SizeMismatch { .. }));
    }

    #[test]
    fn short_pixel_data_is_truncated_not_a_panic() {
        let mut src = bmp(40, 2, 2, 24, &[], &[&[0; 6], &[0; 6]]);
        src.truncate(src.len() - 3);
        let err = BmpDecoder::new().decode(&src, None).unwrap_err();
        assert_eq!(
            err,
            BmpError::Truncated {
                needed: 54 + 16,
                available: 54 + 13
            }
        );
    }

    #[test]
    fn huge_declared_size_is_an_error_not_an_allocation() {
        let src = bmp(40, i32::MAX, i32::MIN, 24, &[], &[]);
        assert_eq!(src.len(), 54);
        let err = BmpDecoder::new().decode(&src, None).unwrap_err();
        assert!(matches!(
            err,
            BmpError::UnsupportedFormat(_) | BmpError::Truncated { .. }
        ));
    }

    #[test]
    fn large_declared_size_without_pixels_is_truncated() {
        let src = bmp(40, 30_000, 30_000, 32, &[], &[]);
        let err = BmpDecoder::new().decode(&src, None).unwrap_err();
        assert_eq!(
            err,
            BmpError::Truncated {
                needed: 54 + 30_000 * 30_000 * 4,
                available: 54,
            }
        );
    }

    #[test]
    fn failed_header_is_not_cached() {
        let mut decoder = BmpDecoder::new();
        assert!(decoder.decode(b"GIF89a", None).is_err());
        assert!(decoder.header().is_none());
    }
}
