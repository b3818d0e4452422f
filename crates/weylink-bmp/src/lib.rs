//! BMP snapshot decoding for weylink.
//!
//! Decodes the constrained bitmap format the encoder writes (uncompressed
//! 8, 24 or 32 bits per pixel, either row order) into a [`BgraFrame`]. A
//! [`BmpDecoder`] parses the header once and reuses it for every later
//! frame of the same stream.

pub mod decoder;
pub mod error;
pub mod frame;
pub mod header;

pub use decoder::BmpDecoder;
pub use error::BmpError;
pub use frame::BgraFrame;
pub use header::{decode_header, BitmapHeader, PixelFormat};
