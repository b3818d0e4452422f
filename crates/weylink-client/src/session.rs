//! A complete client session.
//!
//! [`Session::run`] connects, negotiates capture, then runs three loops
//! until shutdown or a fatal error:
//!
//! - the protocol client's video request ticker,
//! - the frame pump decoding the encoder's snapshot,
//! - a display-rate consumer handing published frames to the caller.
//!
//! Any of them failing, the server going away, or the encoder exiting
//! ends the whole session.

use std::io;
use std::process::ExitStatus;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use weylink_frames::{FramePump, PublishedFrame};
use weylink_protocol::video::frame_interval;
use weylink_protocol::{ProtocolClient, ProtocolError};

use crate::config::Config;
use crate::encoder::EncoderProcess;
use crate::error::SessionError;

type FrameCallback = Box<dyn FnMut(&PublishedFrame) + Send>;

/// Counters reported when a session ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Capturables the server offered.
    pub capturables: Vec<String>,
    /// Frames handed to the callback.
    pub frames_shown: u64,
    /// Frames the pump published that the consumer never saw.
    pub frames_skipped: u64,
    pub last_sequence: u64,
}

impl SessionStats {
    fn record(&mut self, frame: &PublishedFrame) {
        self.frames_skipped += frame.sequence.saturating_sub(self.last_sequence + 1);
        self.frames_shown += 1;
        self.last_sequence = frame.sequence;
    }
}

pub struct Session {
    config: Config,
    on_frame: Option<FrameCallback>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            on_frame: None,
        }
    }

    /// Call `f` with every frame the display loop takes.
    #[must_use]
    pub fn on_frame(mut self, f: impl FnMut(&PublishedFrame) + Send + 'static) -> Self {
        self.on_frame = Some(Box::new(f));
        self
    }

    /// Run until `shutdown` fires or a fatal error occurs.
    pub async fn run(self, shutdown: CancellationToken) -> Result<SessionStats, SessionError> {
        let Self {
            config,
            mut on_frame,
        } = self;
        let cancel = shutdown.child_token();
        let snapshot = config.video.snapshot_path.clone();
        prepare_snapshot_dir(&snapshot)?;

        // The client gets its own child token so a dead connection shows up
        // as a closed client rather than as a shutdown.
        let client = ProtocolClient::with_cancellation(config.client_config(), cancel.child_token());
        let mut encoder = if config.encoder.enabled {
            let (process, sink) = EncoderProcess::spawn(&config.encoder.command, &snapshot)?;
            client.set_binary_sink(sink);
            Some(process)
        } else {
            None
        };

        let mut stats = SessionStats::default();
        let result = match negotiate(&client, &config, &mut stats).await {
            Ok(()) => {
                let loops = Loops {
                    client: &client,
                    config: &config,
                    cancel: &cancel,
                    encoder: encoder.as_mut(),
                };
                loops.run(&mut stats, on_frame.as_mut()).await
            }
            Err(e) => Err(e),
        };

        cancel.cancel();
        client.close().await;
        if let Some(encoder) = encoder {
            encoder.shutdown().await;
        }
        if let Err(e) = std::fs::remove_file(&snapshot) {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(error = %e, "failed to remove snapshot");
            }
        }

        match result {
            Ok(()) => {
                info!(
                    shown = stats.frames_shown,
                    skipped = stats.frames_skipped,
                    "session ended"
                );
                Ok(stats)
            }
            Err(e) => {
                error!(error = %e, "session failed");
                Err(e)
            }
        }
    }
}

/// Connect, list capturables and send the capture configuration.
async fn negotiate(
    client: &ProtocolClient,
    config: &Config,
    stats: &mut SessionStats,
) -> Result<(), SessionError> {
    let url = config.server.url();
    client.connect(&url).await?;

    stats.capturables = client.capturable_list().await?;
    info!(capturables = ?stats.capturables, "server capturables");

    match client.configure(config.capture.to_capture_config()).await {
        Ok(()) => {}
        Err(ProtocolError::ConfigRejected(reason)) => {
            warn!(%reason, "server rejected capture config");
        }
        Err(e) if e.is_fatal() => return Err(e.into()),
        Err(e) => warn!(error = %e, "capture config not applied"),
    }
    Ok(())
}

/// The session's running phase, after negotiation.
struct Loops<'a> {
    client: &'a ProtocolClient,
    config: &'a Config,
    cancel: &'a CancellationToken,
    encoder: Option<&'a mut EncoderProcess>,
}

impl Loops<'_> {
    async fn run(
        mut self,
        stats: &mut SessionStats,
        mut on_frame: Option<&mut FrameCallback>,
    ) -> Result<(), SessionError> {
        let mut tasks = JoinSet::new();
        let video_client = self.client.clone();
        tasks.spawn(async move { video_client.run_video().await.map_err(SessionError::from) });
        let pump = FramePump::new(&self.config.video.snapshot_path, self.config.video.fps);
        let slot = pump.slot();
        let pump_cancel = self.cancel.clone();
        tasks.spawn(async move { pump.run(pump_cancel).await.map_err(SessionError::from) });

        let mut display = tokio::time::interval(frame_interval(self.config.video.fps));
        display.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let outcome = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break Ok(()),
                () = self.client.closed() => break Err(SessionError::ConnectionLost),
                Some(joined) = tasks.join_next() => {
                    break match joined {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(e),
                        Err(e) => Err(SessionError::Task(e.to_string())),
                    };
                }
                status = wait_encoder(self.encoder.as_deref_mut()) => {
                    break Err(SessionError::Encoder(format!("encoder exited: {}", describe(status))));
                }
                _ = display.tick() => {
                    if let Some(frame) = slot.take() {
                        stats.record(&frame);
                        if let Some(callback) = on_frame.as_mut() {
                            callback(&frame);
                        }
                    }
                }
            }
        };
        self.cancel.cancel();
        tasks.shutdown().await;
        outcome
    }
}

fn prepare_snapshot_dir(snapshot: &std::path::Path) -> Result<(), SessionError> {
    if let Some(dir) = snapshot.parent() {
        std::fs::create_dir_all(dir).map_err(|e| {
            SessionError::Config(format!("cannot create {}: {e}", dir.display()))
        })?;
    }
    // A frame left over from an earlier run must not be shown.
    match std::fs::remove_file(snapshot) {
        Ok(()) => debug!(path = %snapshot.display(), "removed stale snapshot"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(SessionError::Config(format!(
                "cannot remove stale snapshot {}: {e}",
                snapshot.display()
            )))
        }
    }
    Ok(())
}

async fn wait_encoder(encoder: Option<&mut EncoderProcess>) -> Result<ExitStatus, SessionError> {
    match encoder {
        Some(encoder) => encoder.wait().await,
        None => std::future::pending().await,
    }
}

fn describe(status: Result<ExitStatus, SessionError>) -> String {
    match status {
        Ok(status) => status.to_string(),
        Err(e) => e.to_string(),
    }
}
