//! Protocol message types
//!
//! One enum covers every tag; the `message` field is the serde tag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::device::identity::DeviceIdentity;
use crate::error::{Error, Result};

/// Tags this crate understands. Anything else becomes [`Message::Unknown`].
pub const KNOWN_TAGS: &[&str] = &[
    "init", "button", "input", "sensor", "channel", "move", "sync", "synced", "status", "error",
    "bye",
];

/// A single protocol record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "lowercase")]
pub enum Message {
    /// Device registration
    Init(DeviceIdentity),
    /// Button activity (click duration in ms, or 0/1 level)
    Button(InputEvent),
    /// Binary input state
    Input(InputEvent),
    /// Sensor reading
    Sensor(InputEvent),
    /// Channel value (controller sets it, or device reports it)
    Channel(ChannelValue),
    /// Movement start/stop for a channel
    Move(MoveCommand),
    /// Controller asks the device to report all channel values
    Sync,
    /// Device finished reporting after a `sync`
    Synced,
    /// Controller's answer to a device request
    Status(StatusReport),
    /// Error notification
    Error(StatusReport),
    /// Device is leaving
    Bye,
    /// Unrecognized tag, kept verbatim
    #[serde(skip)]
    Unknown(UnknownMessage),
}

impl Message {
    /// The wire tag of this message
    pub fn tag(&self) -> &str {
        match self {
            Message::Init(_) => "init",
            Message::Button(_) => "button",
            Message::Input(_) => "input",
            Message::Sensor(_) => "sensor",
            Message::Channel(_) => "channel",
            Message::Move(_) => "move",
            Message::Sync => "sync",
            Message::Synced => "synced",
            Message::Status(_) => "status",
            Message::Error(_) => "error",
            Message::Bye => "bye",
            Message::Unknown(raw) => &raw.tag,
        }
    }

    /// Whether `tag` names one of the typed variants
    pub fn is_known_tag(tag: &str) -> bool {
        KNOWN_TAGS.contains(&tag)
    }

    /// Create a button click of the given duration
    pub fn button(index: u32, duration_ms: u32) -> Self {
        Message::Button(InputEvent::new(index, EventValue::Integer(duration_ms.into())))
    }

    /// Create a channel value message
    pub fn channel(index: u32, value: f64) -> Self {
        Message::Channel(ChannelValue::new(index, value))
    }

    /// Reject values JSON cannot represent.
    ///
    /// serde_json silently writes non-finite floats as `null`, which would
    /// change the meaning of the record.
    pub fn ensure_encodable(&self) -> Result<()> {
        match self {
            Message::Init(identity) => identity.ensure_finite(),
            Message::Button(ev) | Message::Input(ev) | Message::Sensor(ev) => ev.value.ensure_finite(),
            Message::Channel(ch) => finite("channel value", ch.value),
            _ => Ok(()),
        }
    }
}

pub(crate) fn finite(what: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::Encoding(format!("{} is not a finite number: {}", what, value)))
    }
}

/// Value carried by button/input/sensor events.
///
/// Integers stay integers on the wire (`"value":200`); fractional levels
/// use a float.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    /// Whole number (click duration in ms, 0/1 levels)
    Integer(i64),
    /// Fractional level or sensor reading
    Number(f64),
}

impl EventValue {
    /// Numeric value as f64
    pub fn as_f64(&self) -> f64 {
        match *self {
            EventValue::Integer(v) => v as f64,
            EventValue::Number(v) => v,
        }
    }

    fn ensure_finite(&self) -> Result<()> {
        match *self {
            EventValue::Integer(_) => Ok(()),
            EventValue::Number(v) => finite("event value", v),
        }
    }
}

impl From<i64> for EventValue {
    fn from(v: i64) -> Self {
        EventValue::Integer(v)
    }
}

impl From<f64> for EventValue {
    fn from(v: f64) -> Self {
        EventValue::Number(v)
    }
}

impl From<bool> for EventValue {
    fn from(v: bool) -> Self {
        EventValue::Integer(i64::from(v))
    }
}

/// Device-side event (`button`, `input`, `sensor`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    /// Index into the list declared at `init`
    pub index: u32,
    /// Event value
    pub value: EventValue,
}

impl InputEvent {
    /// Create a new event
    pub fn new(index: u32, value: impl Into<EventValue>) -> Self {
        InputEvent {
            index,
            value: value.into(),
        }
    }
}

/// Channel value (`channel`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelValue {
    /// Channel index
    pub index: u32,
    /// Channel type, informational only
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<i32>,
    /// Output level
    pub value: f64,
}

impl ChannelValue {
    /// Create a new channel value without type information
    pub fn new(index: u32, value: f64) -> Self {
        ChannelValue {
            index,
            channel_type: None,
            value,
        }
    }
}

/// Movement command (`move`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCommand {
    /// Channel index
    pub index: u32,
    /// -1 = down/decrease, 0 = stop, 1 = up/increase
    pub direction: i32,
}

/// Result of a status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// Request accepted
    Ok,
    /// Request failed
    Error,
}

/// Payload of `status` and `error` messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusKind>,
    /// Numeric error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errorcode: Option<i64>,
    /// Human-readable error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errormessage: Option<String>,
    /// Error domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errordomain: Option<String>,
}

impl StatusReport {
    /// Create an ok report
    pub fn ok() -> Self {
        StatusReport {
            status: Some(StatusKind::Ok),
            ..Default::default()
        }
    }

    /// Create an error report
    pub fn error(code: i64, message: impl Into<String>) -> Self {
        StatusReport {
            status: Some(StatusKind::Error),
            errorcode: Some(code),
            errormessage: Some(message.into()),
            errordomain: None,
        }
    }

    /// Whether this report signals success
    pub fn is_ok(&self) -> bool {
        self.status == Some(StatusKind::Ok)
    }
}

/// A record whose tag is not in [`KNOWN_TAGS`]
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownMessage {
    /// The `message` field
    pub tag: String,
    /// All fields, including `message`
    pub fields: Map<String, Value>,
}

impl UnknownMessage {
    /// Build an unknown message; the `message` field is set to `tag`
    pub fn new(tag: impl Into<String>, mut fields: Map<String, Value>) -> Self {
        let tag = tag.into();
        fields.insert("message".to_string(), Value::String(tag.clone()));
        UnknownMessage { tag, fields }
    }

    /// Look up a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}
