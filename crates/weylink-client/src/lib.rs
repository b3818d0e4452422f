//! Headless weylink client session.
//!
//! Ties the protocol client, the external encoder process and the frame
//! pump together: the server's video stream is piped into the encoder, the
//! encoder keeps replacing a BMP snapshot, and the pump turns that snapshot
//! into frames for the caller.

pub mod config;
pub mod encoder;
pub mod error;
pub mod session;

pub use config::Config;
pub use encoder::EncoderProcess;
pub use error::SessionError;
pub use session::{Session, SessionStats};
