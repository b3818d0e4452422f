//! Frame request ticker.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::client::ProtocolClient;
use crate::error::ProtocolError;

/// Interval between ticks for a target frame rate; zero counts as one.
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}

impl ProtocolClient {
    /// Drive frame requests at the configured frame rate until the client
    /// is cancelled.
    ///
    /// The first tick asks the server to start video. Ticks are skipped
    /// until the server confirms with `NewVideo`; after that every tick
    /// sends an unacknowledged `TryGetFrame`. A failed request is a dropped
    /// frame unless the connection itself is gone.
    pub async fn run_video(&self) -> Result<(), ProtocolError> {
        let cancel = self.cancellation_token();
        let mut ticker = tokio::time::interval(frame_interval(self.config().fps));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut requested: u64 = 0;
        let mut dropped: u64 = 0;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(requested, dropped, "video loop stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let result = if !self.is_video_requested() {
                self.start_video().await
            } else if self.is_video_confirmed() {
                self.try_get_frame().await.map(|()| requested += 1)
            } else {
                trace!("waiting for video confirmation");
                continue;
            };

            if let Err(e) = result {
                if cancel.is_cancelled() {
                    continue;
                }
                if e.is_fatal() {
                    return Err(e);
                }
                dropped += 1;
                warn!(error = %e, dropped, "dropped frame");
            }
        }
    }
}
