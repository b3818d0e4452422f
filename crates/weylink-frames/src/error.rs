//! Frame pump errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use weylink_bmp::BmpError;

#[derive(Debug, Error)]
pub enum PumpError {
    /// The encoder has not written a snapshot yet. Not fatal.
    #[error("snapshot {0} not ready")]
    NotReady(PathBuf),

    #[error("failed to read snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] BmpError),

    /// The blocking decode task panicked or was aborted.
    #[error("decode worker failed: {0}")]
    Worker(String),
}

impl PumpError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NotReady(_))
    }
}
