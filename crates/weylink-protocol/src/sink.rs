//! Destinations for inbound binary frames.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Receives every binary websocket message verbatim, in arrival order.
#[async_trait]
pub trait BinarySink: Send + 'static {
    /// Write one binary message.
    async fn write_frame(&mut self, data: &[u8]) -> io::Result<()>;

    /// Called once when the dispatcher stops.
    async fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Forwards binary frames into any async writer, e.g. a child's stdin.
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> BinarySink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write_frame(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data).await?;
        self.writer.flush().await
    }

    async fn finish(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Forwards binary frames into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes its frames.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl BinarySink for ChannelSink {
    async fn write_frame(&mut self, data: &[u8]) -> io::Result<()> {
        self.tx
            .send(data.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "binary frame receiver dropped"))
    }
}
