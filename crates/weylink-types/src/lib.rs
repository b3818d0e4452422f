//! Shared types for weylink.
//!
//! This crate contains the wire data model spoken with a Weylus server:
//! command and response tags, pointer/wheel/keyboard input events, the
//! capture configuration, and the outbound message content.

pub mod command;
pub mod error;
pub mod event;
pub mod message;

pub use command::{Command, Response};
pub use error::UnknownTag;
pub use event::{
    ButtonFlags, KeyboardEvent, KeyboardEventType, KeyboardLocation, PointerEvent,
    PointerEventType, PointerType, WheelEvent,
};
pub use message::{CapturableList, CaptureConfig, OutboundContent};
