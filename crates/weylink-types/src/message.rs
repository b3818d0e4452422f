//! Outbound message content and structured server replies.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::command::{Command, Response};
use crate::event::{KeyboardEvent, PointerEvent, WheelEvent};

/// Capture settings negotiated with the server (`Config` command).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub uinput_support: bool,
    pub capture_cursor: bool,
    pub capturable_id: u32,
    pub max_width: u32,
    pub max_height: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_name: String,
}

/// Reply to `GetCapturableList`: `{"CapturableList": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturableList {
    #[serde(rename = "CapturableList")]
    pub capturables: Vec<String>,
}

/// Everything the client can put on the wire.
///
/// Structured payloads serialize as a single-key map from their command tag
/// to the payload; bare commands serialize as the tag string. The tag is
/// always derived from the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundContent {
    Pointer(PointerEvent),
    Wheel(WheelEvent),
    Keyboard(KeyboardEvent),
    Config(CaptureConfig),
    Command(Command),
}

impl OutboundContent {
    /// The command tag this content is sent under.
    pub fn command(&self) -> Command {
        match self {
            Self::Pointer(_) => Command::PointerEvent,
            Self::Wheel(_) => Command::WheelEvent,
            Self::Keyboard(_) => Command::KeyboardEvent,
            Self::Config(_) => Command::Config,
            Self::Command(cmd) => *cmd,
        }
    }

    /// The response that completes this content's command, if any.
    pub fn expected_response(&self) -> Option<Response> {
        self.command().expected_response()
    }

    /// Whether this content travels as a bare string.
    pub fn is_bare(&self) -> bool {
        matches!(self, Self::Command(_))
    }
}

impl From<PointerEvent> for OutboundContent {
    fn from(event: PointerEvent) -> Self {
        Self::Pointer(event)
    }
}

impl From<WheelEvent> for OutboundContent {
    fn from(event: WheelEvent) -> Self {
        Self::Wheel(event)
    }
}

impl From<KeyboardEvent> for OutboundContent {
    fn from(event: KeyboardEvent) -> Self {
        Self::Keyboard(event)
    }
}

impl From<CaptureConfig> for OutboundContent {
    fn from(config: CaptureConfig) -> Self {
        Self::Config(config)
    }
}

impl From<Command> for OutboundContent {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}

impl Serialize for OutboundContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tag = self.command();
        match self {
            Self::Pointer(event) => single_entry(serializer, tag, event),
            Self::Wheel(event) => single_entry(serializer, tag, event),
            Self::Keyboard(event) => single_entry(serializer, tag, event),
            Self::Config(config) => single_entry(serializer, tag, config),
            Self::Command(cmd) => serializer.serialize_str(cmd.as_str()),
        }
    }
}

fn single_entry<S: Serializer, T: Serialize>(
    serializer: S,
    tag: Command,
    payload: &T,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(&tag, payload)?;
    map.end()
}

impl<'de> Deserialize<'de> for OutboundContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OutboundVisitor)
    }
}

struct OutboundVisitor;

impl<'de> Visitor<'de> for OutboundVisitor {
    type Value = OutboundContent;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a command name or a single-key map from command to payload")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        value
            .parse::<Command>()
            .map(OutboundContent::Command)
            .map_err(E::custom)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let tag: Command = map
            .next_key()?
            .ok_or_else(|| <A::Error as de::Error>::custom("empty outbound map"))?;
        let content = match tag {
            Command::PointerEvent => OutboundContent::Pointer(map.next_value()?),
            Command::WheelEvent => OutboundContent::Wheel(map.next_value()?),
            Command::KeyboardEvent => OutboundContent::Keyboard(map.next_value()?),
            Command::Config => OutboundContent::Config(map.next_value()?),
            other => {
                return Err(de::Error::custom(format!(
                    "command {other} carries no payload"
                )))
            }
        };
        if map.next_key::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::custom("outbound map has more than one key"));
        }
        Ok(content)
    }
}
