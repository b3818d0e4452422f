//! Wire format: JSON text messages.
//!
//! Outbound messages are either a bare command string (`"TryGetFrame"`) or
//! a single-key object mapping a command tag to its payload
//! (`{"Config": {...}}`).
//!
//! Inbound text is classified by looking for known response tags anywhere
//! in the raw payload, in a fixed order, before falling back to a generic
//! JSON decode. A window title containing `Error` in a capturable list is
//! still a `CapturableList` because that tag is tried first.

use serde::Deserialize;
use serde_json::Value;
use weylink_types::{CapturableList, Command, OutboundContent, Response};

use crate::error::ProtocolError;

/// Maximum inbound message size (just over 512 KiB). Larger messages are a
/// transport error.
pub const MAX_MESSAGE_SIZE: usize = 32769 * 16;

/// One outbound message, tagged with the command it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    command: Command,
    body: Value,
}

impl Envelope {
    pub fn command(&self) -> Command {
        self.command
    }

    /// The JSON value sent on the wire.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Serialize to the text frame payload.
    pub fn to_text(&self) -> String {
        self.body.to_string()
    }
}

/// Wrap outbound content in its wire envelope.
pub fn wrap(content: &OutboundContent) -> Result<Envelope, ProtocolError> {
    let body =
        serde_json::to_value(content).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
    Ok(Envelope {
        command: content.command(),
        body,
    })
}

/// Decode an outbound text frame back into its content.
///
/// The client never receives these; this exists for servers, tests and
/// traffic inspection.
pub fn decode_outbound(text: &str) -> Result<OutboundContent, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))
}

/// A classified inbound text message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    CapturableList(CapturableList),
    ConfigError(String),
    Error(String),
    /// Anything else that is valid JSON, e.g. `"ConfigOk"` or `"NewVideo"`.
    Value(Value),
}

impl Inbound {
    /// Short name of this reply's shape, used in mismatch errors.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::CapturableList(_) => "CapturableList",
            Self::ConfigError(_) => "ConfigError",
            Self::Error(_) => "Error",
            Self::Value(Value::String(_)) => "string",
            Self::Value(Value::Object(_)) => "object",
            Self::Value(Value::Array(_)) => "array",
            Self::Value(Value::Number(_)) => "number",
            Self::Value(Value::Bool(_)) => "bool",
            Self::Value(Value::Null) => "null",
        }
    }
}

#[derive(Deserialize)]
struct ConfigErrorReply {
    #[serde(rename = "ConfigError")]
    message: String,
}

#[derive(Deserialize)]
struct ErrorReply {
    #[serde(rename = "Error")]
    message: String,
}

/// Classify an inbound text payload.
///
/// Tags are tried in order `CapturableList`, `ConfigError`, `Error`. A tag
/// that is present but whose payload does not have the expected shape is a
/// deserialisation error, not a fallback to the generic decode.
pub fn parse(data: &[u8]) -> Result<Inbound, ProtocolError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| ProtocolError::Deserialization(format!("inbound text is not UTF-8: {e}")))?;

    if Response::CapturableList.matches(text) {
        let list: CapturableList = serde_json::from_str(text).map_err(|e| {
            ProtocolError::Deserialization(format!("CapturableList: {e}: {text}"))
        })?;
        return Ok(Inbound::CapturableList(list));
    }
    if Response::ConfigError.matches(text) {
        let reply: ConfigErrorReply = serde_json::from_str(text)
            .map_err(|e| ProtocolError::Deserialization(format!("ConfigError: {e}: {text}")))?;
        return Ok(Inbound::ConfigError(reply.message));
    }
    if Response::Error.matches(text) {
        let reply: ErrorReply = serde_json::from_str(text)
            .map_err(|e| ProtocolError::Deserialization(format!("Error: {e}: {text}")))?;
        return Ok(Inbound::Error(reply.message));
    }

    serde_json::from_str(text)
        .map(Inbound::Value)
        .map_err(|e| ProtocolError::Deserialization(format!("{e}: {text}")))
}

/// A reply type a command can be awaited as.
pub trait FromInbound: Sized {
    /// Shape name reported when a different reply arrives.
    const SHAPE: &'static str;

    /// Extract `Self`, handing the reply back if it has another shape.
    fn from_inbound(inbound: Inbound) -> Result<Self, Inbound>;
}

impl FromInbound for CapturableList {
    const SHAPE: &'static str = "CapturableList";

    fn from_inbound(inbound: Inbound) -> Result<Self, Inbound> {
        match inbound {
            Inbound::CapturableList(list) => Ok(list),
            other => Err(other),
        }
    }
}

impl FromInbound for String {
    const SHAPE: &'static str = "string";

    fn from_inbound(inbound: Inbound) -> Result<Self, Inbound> {
        match inbound {
            Inbound::Value(Value::String(s)) => Ok(s),
            other => Err(other),
        }
    }
}

impl FromInbound for Value {
    const SHAPE: &'static str = "JSON value";

    fn from_inbound(inbound: Inbound) -> Result<Self, Inbound> {
        match inbound {
            Inbound::Value(value) => Ok(value),
            other => Err(other),
        }
    }
}

/// Turn a raw reply into the caller's expected type.
///
/// Server-reported errors take precedence over the type check.
pub fn expect_reply<T: FromInbound>(data: &[u8]) -> Result<T, ProtocolError> {
    match parse(data)? {
        Inbound::ConfigError(message) => Err(ProtocolError::ConfigRejected(message)),
        Inbound::Error(message) => Err(ProtocolError::Server(message)),
        inbound => T::from_inbound(inbound).map_err(|got| ProtocolError::UnexpectedResponse {
            expected: T::SHAPE,
            received: got.shape(),
        }),
    }
}
