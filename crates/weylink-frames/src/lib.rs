//! Frame acquisition for weylink.
//!
//! A [`FramePump`] wakes at the target frame rate, memory-maps the snapshot
//! file the encoder keeps replacing, decodes it and publishes the result
//! into a [`FrameSlot`]. The display side takes from the slot whenever it
//! is ready; neither side waits for the other.

pub mod error;
pub mod pump;
pub mod slot;

pub use error::PumpError;
pub use pump::{FramePump, PublishedFrame};
pub use slot::FrameSlot;
