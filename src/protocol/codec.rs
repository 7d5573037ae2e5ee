//! Record framing
//!
//! `encode`/`decode` work on single records. [`MessageCodec`] plugs the same
//! rules into `tokio_util::codec` for connection streams, buffering partial
//! lines across reads.

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use super::message::{Message, UnknownMessage};
use crate::error::{Error, Result};

/// Records longer than this are dropped by the stream decoder
pub const DEFAULT_MAX_RECORD_LEN: usize = 1024 * 1024;

/// Encode a message as one `\n`-terminated record
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    message.ensure_encodable()?;
    let mut buf = match message {
        Message::Unknown(raw) => serde_json::to_vec(&raw.fields),
        known => serde_json::to_vec(known),
    }
    .map_err(|e| Error::Encoding(e.to_string()))?;
    buf.push(b'\n');
    Ok(buf)
}

/// Encode any serializable value as one `\n`-terminated record
pub fn encode_record<T: Serialize + ?Sized>(record: &T) -> Result<Vec<u8>> {
    let mut buf = serde_json::to_vec(record).map_err(|e| Error::Encoding(e.to_string()))?;
    buf.push(b'\n');
    Ok(buf)
}

/// Decode one record with its terminator already removed
pub fn decode(line: &str) -> Result<Message> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| Error::Decoding(format!("invalid JSON: {}", e)))?;

    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(Error::Decoding(format!(
                "record is not a JSON object: {}",
                other
            )))
        }
    };

    let tag = match fields.get("message") {
        Some(Value::String(tag)) => tag.clone(),
        Some(other) => {
            return Err(Error::Decoding(format!(
                "'message' field is not a string: {}",
                other
            )))
        }
        None => return Err(Error::Decoding("missing 'message' field".to_string())),
    };

    if !Message::is_known_tag(&tag) {
        return Ok(Message::Unknown(UnknownMessage::new(tag, fields)));
    }

    serde_json::from_value(Value::Object(fields))
        .map_err(|e| Error::Decoding(format!("malformed '{}' message: {}", tag, e)))
}

/// Streaming codec for device connections.
///
/// Malformed and oversized records are logged and skipped; the stream only
/// fails on I/O errors.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    lines: LinesCodec,
    max_record_len: usize,
}

impl MessageCodec {
    /// Create a codec with the default record limit
    pub fn new() -> Self {
        Self::with_max_record_len(DEFAULT_MAX_RECORD_LEN)
    }

    /// Create a codec with a custom record limit
    pub fn with_max_record_len(max_record_len: usize) -> Self {
        MessageCodec {
            lines: LinesCodec::new_with_max_length(max_record_len),
            max_record_len,
        }
    }

    /// Maximum accepted record length in bytes
    pub fn max_record_len(&self) -> usize {
        self.max_record_len
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        loop {
            let line = match self.lines.decode(src) {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(None),
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!(
                        max = self.max_record_len,
                        "Dropping record longer than the maximum record length"
                    );
                    continue;
                }
                Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                    warn!("Dropping record that is not valid UTF-8");
                    continue;
                }
                Err(LinesCodecError::Io(e)) => return Err(e.into()),
            };

            if line.trim().is_empty() {
                continue;
            }

            match decode(&line) {
                Ok(message) => {
                    debug!("Record received: {}", line);
                    return Ok(Some(message));
                }
                Err(e) => warn!("Dropping record: {} (raw: {})", e, line),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if !src.is_empty() {
            debug!(bytes = src.len(), "Discarding unterminated record at end of stream");
            src.clear();
        }
        self.lines = LinesCodec::new_with_max_length(self.max_record_len);
        Ok(None)
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let record = encode(&item)?;
        dst.reserve(record.len());
        dst.put_slice(&record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{EventValue, InputEvent, MoveCommand, StatusReport};
    use serde_json::json;

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::button(0, 200),
            Message::channel(1, 75.5),
            Message::Input(InputEvent::new(3, EventValue::Integer(1))),
            Message::Sensor(InputEvent::new(0, 21.25)),
            Message::Move(MoveCommand {
                index: 0,
                direction: -1,
            }),
            Message::Sync,
            Message::Synced,
            Message::Status(StatusReport::error(7, "bad\nthing")),
            Message::Bye,
        ]
    }

    fn decode_all(codec: &mut MessageCodec, buf: &mut BytesMut) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(message) = codec.decode(buf).unwrap() {
            out.push(message);
        }
        out
    }

    #[test]
    fn test_round_trip() {
        for message in sample_messages() {
            let bytes = encode(&message).unwrap();
            assert_eq!(bytes.last(), Some(&b'\n'));
            let body = std::str::from_utf8(&bytes[..bytes.len() - 1]).unwrap();
            assert!(!body.contains('\n'), "embedded newline in {}", body);
            assert_eq!(decode(body).unwrap(), message);
        }
    }

    #[test]
    fn test_unknown_tag_round_trips_verbatim() {
        let line = r#"{"message":"log","level":5,"text":"hi"}"#;
        let message = decode(line).unwrap();
        assert_eq!(message.tag(), "log");
        let encoded = encode(&message).unwrap();
        let reparsed: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(reparsed, json!({"message": "log", "level": 5, "text": "hi"}));
    }

    #[test]
    fn test_decode_rejects_non_messages() {
        for line in ["not json", "[1,2]", "42", r#"{"index":0}"#, r#"{"message":3}"#] {
            assert!(
                matches!(decode(line), Err(Error::Decoding(_))),
                "accepted {:?}",
                line
            );
        }
        assert!(matches!(
            decode(r#"{"message":"channel","index":"x"}"#),
            Err(Error::Decoding(_))
        ));
    }

    #[test]
    fn test_encode_rejects_non_finite() {
        assert!(matches!(
            encode(&Message::channel(0, f64::INFINITY)),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn test_split_stream_matches_whole_stream() {
        let mut wire = Vec::new();
        for message in sample_messages() {
            wire.extend(encode(&message).unwrap());
        }

        let mut codec = MessageCodec::new();
        let whole = decode_all(&mut codec, &mut BytesMut::from(&wire[..]));
        assert_eq!(whole, sample_messages());

        for chunk_size in [1, 2, 3, 7, 16, 61] {
            let mut codec = MessageCodec::new();
            let mut buf = BytesMut::new();
            let mut got = Vec::new();
            for chunk in wire.chunks(chunk_size) {
                buf.extend_from_slice(chunk);
                got.extend(decode_all(&mut codec, &mut buf));
            }
            assert_eq!(got, whole, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_coalesced_records_in_one_read() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(
            &b"{\"message\":\"channel\",\"index\":0,\"value\":1}\n{\"message\":\"sync\"}\n"[..],
        );
        assert_eq!(
            decode_all(&mut codec, &mut buf),
            vec![Message::channel(0, 1.0), Message::Sync]
        );
    }

    #[test]
    fn test_bad_records_are_skipped() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(
            &b"garbage\n\n  \r\n{\"message\":\"sync\"}\r\n\xff\xfe\n{\"message\":\"bye\"}\n"[..],
        );
        assert_eq!(
            decode_all(&mut codec, &mut buf),
            vec![Message::Sync, Message::Bye]
        );
    }

    #[test]
    fn test_oversized_record_is_dropped() {
        let mut codec = MessageCodec::with_max_record_len(32);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(format!("{{\"message\":\"x\",\"pad\":\"{}\"}}\n", "a".repeat(64)).as_bytes());
        buf.extend_from_slice(b"{\"message\":\"sync\"}\n");
        assert_eq!(decode_all(&mut codec, &mut buf), vec![Message::Sync]);
    }

    #[test]
    fn test_unterminated_tail_discarded_at_eof() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&b"{\"message\":\"sync\"}\n{\"message\":\"by"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(Message::Sync));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encoder_appends_records() {
        let mut codec = MessageCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(Message::Synced, &mut dst).unwrap();
        codec.encode(Message::button(1, 50), &mut dst).unwrap();
        assert_eq!(
            &dst[..],
            &b"{\"message\":\"synced\"}\n{\"message\":\"button\",\"index\":1,\"value\":50}\n"[..]
        );
    }
}
