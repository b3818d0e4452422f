//! Input event types.
//!
//! These mirror the DOM pointer, wheel and keyboard events the server
//! expects, field for field. Producing them from real input devices is the
//! job of the UI layer.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::UnknownTag;

/// Kind of device behind a pointer event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerType {
    #[default]
    #[serde(rename = "")]
    Unknown,
    Mouse,
    Pen,
    Touch,
}

/// Phase of a pointer interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerEventType {
    #[serde(rename = "pointerdown")]
    Down,
    #[serde(rename = "pointerup")]
    Up,
    #[serde(rename = "pointercancel")]
    Cancel,
    #[default]
    #[serde(rename = "pointermove")]
    Move,
}

/// Phase of a key interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyboardEventType {
    #[default]
    Down,
    Up,
    Repeat,
}

/// Physical area of the keyboard a key belongs to.
///
/// Serialized as its integer code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum KeyboardLocation {
    /// Not identified as belonging to a particular area.
    #[default]
    Standard,
    Left,
    Right,
    Numpad,
}

impl From<KeyboardLocation> for u8 {
    fn from(location: KeyboardLocation) -> Self {
        match location {
            KeyboardLocation::Standard => 0,
            KeyboardLocation::Left => 1,
            KeyboardLocation::Right => 2,
            KeyboardLocation::Numpad => 3,
        }
    }
}

impl TryFrom<u8> for KeyboardLocation {
    type Error = UnknownTag;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Standard),
            1 => Ok(Self::Left),
            2 => Ok(Self::Right),
            3 => Ok(Self::Numpad),
            other => Err(UnknownTag::new("keyboard location", &other.to_string())),
        }
    }
}

bitflags! {
    /// Pressed pointer buttons, as in `PointerEvent.buttons`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ButtonFlags: u8 {
        /// Usually the left button, or pen contact.
        const PRIMARY = 1;
        /// Usually the right button.
        const SECONDARY = 1 << 1;
        /// Usually the wheel or middle button.
        const AUXILIARY = 1 << 2;
        /// Typically browser back.
        const FOURTH = 1 << 3;
        /// Typically browser forward.
        const FIFTH = 1 << 4;
        const ERASER = 1 << 5;
    }
}

impl Default for ButtonFlags {
    fn default() -> Self {
        Self::empty()
    }
}

// Sent as a plain integer rather than bitflags' textual form.
impl Serialize for ButtonFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for ButtonFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(Self::from_bits_retain)
    }
}

/// A pointer (mouse, pen or touch) event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub event_type: PointerEventType,
    pub pointer_type: PointerType,
    /// Normalised 0.0..1.0 across the captured surface.
    pub x: f64,
    pub y: f64,
    pub pressure: f64,
    pub width: f64,
    pub height: f64,
    pub pointer_id: i64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub movement_x: i64,
    pub movement_y: i64,
    pub tilt_x: i32,
    pub tilt_y: i32,
    pub twist: i32,
    /// The button whose state changed with this event.
    pub button: ButtonFlags,
    /// All buttons held while this event fired.
    pub buttons: ButtonFlags,
    pub is_primary: bool,
}

/// A scroll wheel event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelEvent {
    pub dx: i32,
    pub dy: i32,
    pub timestamp: u64,
}

/// A key press, release or repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardEvent {
    pub event_type: KeyboardEventType,
    /// Physical key, e.g. `KeyA`.
    pub code: String,
    /// Produced character or named key, e.g. `a` or `Enter`.
    pub key: String,
    pub location: KeyboardLocation,
    pub alt: bool,
    pub ctrl: bool,
    pub shift: bool,
    pub meta: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_event_wire_names() {
        let event = PointerEvent {
            event_type: PointerEventType::Down,
            pointer_type: PointerType::Pen,
            x: 0.25,
            y: 0.75,
            pressure: 0.5,
            buttons: ButtonFlags::PRIMARY | ButtonFlags::ERASER,
            button: ButtonFlags::PRIMARY,
            is_primary: true,
            ..PointerEvent::default()
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "pointerdown");
        assert_eq!(json["pointer_type"], "pen");
        assert_eq!(json["buttons"], 33);
        assert_eq!(json["button"], 1);
        assert_eq!(json["is_primary"], true);
        assert_eq!(json["tilt_x"], 0);
    }

    #[test]
    fn unknown_pointer_type_is_empty_string() {
        assert_eq!(serde_json::to_string(&PointerType::Unknown).unwrap(), "\"\"");
        let parsed: PointerType = serde_json::from_str("\"touch\"").unwrap();
        assert_eq!(parsed, PointerType::Touch);
    }

    #[test]
    fn keyboard_location_is_integer() {
        let event = KeyboardEvent {
            event_type: KeyboardEventType::Repeat,
            code: "Numpad5".to_string(),
            key: "5".to_string(),
            location: KeyboardLocation::Numpad,
            ..KeyboardEvent::default()
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["location"], 3);
        assert_eq!(json["event_type"], "repeat");

        let back: KeyboardEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn keyboard_location_out_of_range() {
        let result: Result<KeyboardLocation, _> = serde_json::from_str("7");
        assert!(result.is_err());
    }

    #[test]
    fn button_flags_keep_unknown_bits() {
        let flags: ButtonFlags = serde_json::from_str("192").unwrap();
        assert_eq!(flags.bits(), 192);
        assert!(!flags.contains(ButtonFlags::PRIMARY));
    }

    #[test]
    fn wheel_event_fields() {
        let json = serde_json::to_string(&WheelEvent {
            dx: -10,
            dy: 30,
            timestamp: 99,
        })
        .unwrap();
        assert_eq!(json, r#"{"dx":-10,"dy":30,"timestamp":99}"#);
    }
}
