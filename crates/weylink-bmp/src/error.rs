//! Bitmap decoding errors.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BmpError {
    #[error("invalid BMP magic")]
    InvalidMagic,

    #[error("unsupported BMP: {0}")]
    UnsupportedFormat(String),

    #[error("image size mismatch: {width}x{height} != {expected_width}x{expected_height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[error("BMP truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
}
