//! Session errors.

use thiserror::Error;
use weylink_frames::PumpError;
use weylink_protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("frame pump error: {0}")]
    Pump(#[from] PumpError),

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("connection to the server was lost")]
    ConnectionLost,

    #[error("session task failed: {0}")]
    Task(String),
}
