//! Protocol and transport errors.

use std::time::Duration;

use thiserror::Error;
use weylink_types::Command;

use crate::client::ClientState;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("websocket not connected")]
    NotConnected,

    #[error("client is {current}, expected {expected}")]
    InvalidState {
        current: ClientState,
        expected: ClientState,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialisation error: {0}")]
    Serialization(String),

    #[error("deserialisation error: {0}")]
    Deserialization(String),

    #[error("unexpected response: expected {expected}, received {received}")]
    UnexpectedResponse {
        expected: &'static str,
        received: &'static str,
    },

    #[error("{0} has no response to wait for")]
    NoResponse(Command),

    #[error("server error: {0}")]
    Server(String),

    #[error("configuration rejected: {0}")]
    ConfigRejected(String),

    #[error("{command} timed out after {after:?}")]
    Timeout { command: Command, after: Duration },

    #[error("operation cancelled")]
    Cancelled,
}

impl ProtocolError {
    /// Whether this error means the connection is gone and the client must
    /// be rebuilt and reconnected.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Cancelled | Self::NotConnected)
    }
}
