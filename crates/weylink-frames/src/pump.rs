//! The decode-and-publish loop.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use memmap2::Mmap;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};
use weylink_bmp::{BgraFrame, BmpDecoder};

use crate::error::PumpError;
use crate::slot::FrameSlot;

/// A decoded snapshot and its position in the pump's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFrame {
    /// Starts at 1 and increases by one per published frame.
    pub sequence: u64,
    pub frame: BgraFrame,
}

/// Periodically decodes the snapshot at `path` into a [`FrameSlot`].
#[derive(Debug)]
pub struct FramePump {
    path: PathBuf,
    period: Duration,
    decoder: BmpDecoder,
    slot: FrameSlot<PublishedFrame>,
    /// Buffer of a frame the consumer skipped, decoded into next.
    spare: Option<BgraFrame>,
    sequence: u64,
}

impl FramePump {
    pub fn new(path: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            path: path.into(),
            period: Duration::from_secs(1) / fps.max(1),
            decoder: BmpDecoder::new(),
            slot: FrameSlot::new(),
            spare: None,
            sequence: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Handle for the consumer side.
    pub fn slot(&self) -> FrameSlot<PublishedFrame> {
        self.slot.clone()
    }

    /// Number of frames published so far.
    pub fn published(&self) -> u64 {
        self.sequence
    }

    /// Map, decode and publish the current snapshot once.
    ///
    /// Returns the sequence number of the published frame.
    pub fn tick(&mut self) -> Result<u64, PumpError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PumpError::NotReady(self.path.clone()));
            }
            Err(e) => return Err(self.io_error(e)),
        };
        let len = file.metadata().map_err(|e| self.io_error(e))?.len();
        if len == 0 {
            return Err(PumpError::NotReady(self.path.clone()));
        }
        let map = map_snapshot(&file).map_err(|e| self.io_error(e))?;

        let frame = self.decoder.decode(&map, self.spare.take())?;
        self.sequence += 1;
        let published = PublishedFrame {
            sequence: self.sequence,
            frame,
        };
        if let Some(skipped) = self.slot.publish(published) {
            trace!(sequence = skipped.sequence, "frame replaced before it was taken");
            self.spare = Some(skipped.frame);
        }
        Ok(self.sequence)
    }

    /// Tick at the configured rate until `cancel` fires.
    ///
    /// Each tick runs on the blocking pool so mapping and decoding never
    /// hold up the runtime's other tasks. A missing snapshot is skipped; any
    /// other error stops the pump.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), PumpError> {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(path = %self.path.display(), period = ?self.period, "frame pump started");

        let mut pump = self;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(published = pump.sequence, "frame pump stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }
            let (returned, result) = tokio::task::spawn_blocking(move || {
                let result = pump.tick();
                (pump, result)
            })
            .await
            .map_err(|e| PumpError::Worker(e.to_string()))?;
            pump = returned;
            match result {
                Ok(sequence) => trace!(sequence, "published frame"),
                Err(PumpError::NotReady(path)) => {
                    debug!(path = %path.display(), "snapshot not ready");
                }
                Err(e) => {
                    error!(error = %e, "frame pump failed");
                    return Err(e);
                }
            }
        }
    }

    fn io_error(&self, source: io::Error) -> PumpError {
        PumpError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[allow(unsafe_code)]
fn map_snapshot(file: &File) -> io::Result<Mmap> {
    // SAFETY: the encoder publishes each snapshot by renaming a complete
    // file over the path, so the inode behind `file` is never modified or
    // truncated while it is mapped.
    unsafe { Mmap::map(file) }
}
