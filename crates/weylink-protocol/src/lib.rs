//! WebSocket protocol client for weylink.
//!
//! This crate owns the connection to a Weylus server: JSON envelope
//! encoding and substring-based reply classification (via serde_json), a
//! registry of per-tag event callbacks, and the client that runs the socket
//! reader and message dispatcher and correlates commands with replies.

pub mod callback;
pub mod client;
pub mod error;
pub mod sink;
pub mod video;
pub mod wire;

pub use callback::{CallbackRegistry, CallbackToken};
pub use client::{ClientConfig, ClientState, ProtocolClient};
pub use error::ProtocolError;
pub use sink::{BinarySink, ChannelSink, WriterSink};
pub use wire::{Envelope, FromInbound, Inbound, MAX_MESSAGE_SIZE};
