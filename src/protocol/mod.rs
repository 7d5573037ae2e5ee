//! Device protocol - line-delimited JSON messages
//!
//! Every record on the wire is one JSON object followed by `\n`. Device
//! connections and gateway calls share this framing; only their lifecycles
//! differ.
//!
//! ## Message Types
//!
//! - `init`, `button`, `input`, `sensor`, `synced`, `bye`: device to controller
//! - `channel`: both directions (controller sets a value, device reports one)
//! - `move`, `sync`, `status`, `error`: controller to device
//!
//! Any other `message` tag decodes as [`Message::Unknown`] and is carried
//! through unchanged.

pub mod codec;
pub mod message;

pub use codec::{decode, encode, encode_record, MessageCodec, DEFAULT_MAX_RECORD_LEN};
pub use message::{
    ChannelValue, EventValue, InputEvent, Message, MoveCommand, StatusKind, StatusReport,
    UnknownMessage, KNOWN_TAGS,
};
