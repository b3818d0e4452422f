//! Command and response tags.
//!
//! Tags appear verbatim on the wire: as the single key of an outbound
//! payload mapping, as a bare outbound string, or somewhere inside an
//! inbound text message.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownTag;

/// Requests the client can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Command {
    TryGetFrame,
    GetCapturableList,
    Config,
    KeyboardEvent,
    PointerEvent,
    WheelEvent,
}

impl Command {
    pub const ALL: [Self; 6] = [
        Self::TryGetFrame,
        Self::GetCapturableList,
        Self::Config,
        Self::KeyboardEvent,
        Self::PointerEvent,
        Self::WheelEvent,
    ];

    /// The wire spelling of this command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TryGetFrame => "TryGetFrame",
            Self::GetCapturableList => "GetCapturableList",
            Self::Config => "Config",
            Self::KeyboardEvent => "KeyboardEvent",
            Self::PointerEvent => "PointerEvent",
            Self::WheelEvent => "WheelEvent",
        }
    }

    /// The response that completes this command, if the server answers it.
    ///
    /// Input events and frame requests are fire-and-forget.
    pub fn expected_response(self) -> Option<Response> {
        match self {
            Self::GetCapturableList => Some(Response::CapturableList),
            Self::Config => Some(Response::ConfigOk),
            Self::TryGetFrame | Self::KeyboardEvent | Self::PointerEvent | Self::WheelEvent => {
                None
            }
        }
    }

    /// Responses that signal this command was rejected.
    ///
    /// The generic `Error` tag applies to every command.
    pub fn failure_responses(self) -> &'static [Response] {
        match self {
            Self::Config => &[Response::ConfigError, Response::Error],
            _ => &[Response::Error],
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownTag::new("command", s))
    }
}

/// Messages the server can send.
///
/// Ordering follows declaration order, which is also the order in which
/// handlers for different tags are run when one message matches several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Response {
    NewVideo,
    CapturableList,
    ConfigOk,
    ConfigError,
    Error,
}

impl Response {
    pub const ALL: [Self; 5] = [
        Self::NewVideo,
        Self::CapturableList,
        Self::ConfigOk,
        Self::ConfigError,
        Self::Error,
    ];

    /// The wire spelling of this response.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewVideo => "NewVideo",
            Self::CapturableList => "CapturableList",
            Self::ConfigOk => "ConfigOk",
            Self::ConfigError => "ConfigError",
            Self::Error => "Error",
        }
    }

    /// Whether this tag occurs anywhere in `text`.
    ///
    /// This is a raw substring test: `"ConfigError"` also matches `Error`.
    pub fn matches(self, text: &str) -> bool {
        text.contains(self.as_str())
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Response {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownTag::new("response", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_queries_expect_a_response() {
        assert_eq!(
            Command::GetCapturableList.expected_response(),
            Some(Response::CapturableList)
        );
        assert_eq!(Command::Config.expected_response(), Some(Response::ConfigOk));
        for cmd in [
            Command::TryGetFrame,
            Command::KeyboardEvent,
            Command::PointerEvent,
            Command::WheelEvent,
        ] {
            assert_eq!(cmd.expected_response(), None, "{cmd}");
        }
    }

    #[test]
    fn tags_parse_back() {
        for cmd in Command::ALL {
            assert_eq!(cmd.as_str().parse::<Command>().unwrap(), cmd);
        }
        for resp in Response::ALL {
            assert_eq!(resp.as_str().parse::<Response>().unwrap(), resp);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = "Bogus".parse::<Command>().unwrap_err();
        assert_eq!(err.kind, "command");
        assert_eq!(err.value, "Bogus");
        assert!("configok".parse::<Response>().is_err());
    }

    #[test]
    fn serde_uses_wire_spelling() {
        assert_eq!(
            serde_json::to_string(&Command::TryGetFrame).unwrap(),
            "\"TryGetFrame\""
        );
        let resp: Response = serde_json::from_str("\"ConfigOk\"").unwrap();
        assert_eq!(resp, Response::ConfigOk);
    }

    #[test]
    fn config_error_also_matches_error() {
        let text = r#"{"ConfigError":"bad capturable"}"#;
        assert!(Response::ConfigError.matches(text));
        assert!(Response::Error.matches(text));
        assert!(!Response::ConfigOk.matches(text));
    }
}
