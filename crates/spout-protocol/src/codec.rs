//! Codec for the `text/event-stream` wire format.
//!
//! An encoded message is a block of `field: value` lines in a fixed order
//! (`id`, `retry`, `event`, then one `data` line per payload line) closed by a
//! blank line. Empty fields are omitted; the blank line is always written.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt::Write;
use thiserror::Error;

use crate::message::Message;

/// Maximum size of a buffered, not yet terminated event block (1 MiB).
pub const MAX_EVENT_SIZE: usize = 1024 * 1024;

/// Errors raised while decoding an event stream.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Buffered data exceeds the maximum without a block terminator.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_SIZE}")]
    EventTooLarge(usize),

    /// Event block is not valid UTF-8.
    #[error("Event is not valid UTF-8")]
    InvalidUtf8,

    /// Retry field is not a non-negative integer.
    #[error("Invalid retry value: {0}")]
    InvalidRetry(String),
}

/// Encode a message using its own retry hint.
#[must_use]
pub fn encode(message: &Message) -> Bytes {
    encode_stamped(message, message.retry())
}

/// Encode a message with `retry_ms` written in place of its own retry hint.
///
/// A stamp of 0 omits the `retry` field.
#[must_use]
pub fn encode_stamped(message: &Message, retry_ms: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len_hint(message));
    encode_into(message, retry_ms, &mut buf);
    buf.freeze()
}

/// Encode a message into an existing buffer.
pub fn encode_into(message: &Message, retry_ms: u64, buf: &mut BytesMut) {
    if !message.id().is_empty() {
        put_field(buf, "id", message.id());
    }

    if retry_ms > 0 {
        // Writing into a BytesMut cannot fail.
        let _ = writeln!(buf, "retry: {retry_ms}");
    }

    if !message.event().is_empty() {
        put_field(buf, "event", message.event());
    }

    if !message.data().is_empty() {
        for line in event_lines(message.data()) {
            put_field(buf, "data", line);
        }
    }

    buf.put_u8(b'\n');
}

fn put_field(buf: &mut BytesMut, name: &str, value: &str) {
    buf.reserve(name.len() + value.len() + 3);
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.put_u8(b'\n');
}

fn encoded_len_hint(message: &Message) -> usize {
    let data_lines = message.data().matches('\n').count() + 1;
    message.id().len() + message.event().len() + message.data().len() + data_lines * 7 + 32
}

/// Try to decode one event block from a buffer, advancing it if successful.
///
/// Returns `Ok(Some(message))` if a complete block was consumed and
/// `Ok(None)` if more data is needed.
///
/// # Errors
///
/// Returns an error if the buffered block is too large, is not UTF-8, or
/// carries a malformed `retry` field.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
    loop {
        let Some(end) = find_block_end(buf) else {
            if buf.len() > MAX_EVENT_SIZE {
                return Err(ProtocolError::EventTooLarge(buf.len()));
            }
            return Ok(None);
        };

        let block = buf.split_to(end);
        // Blocks without any line (e.g. the `\n` of a `\r\n` split across
        // two blocks) carry no event.
        if block.iter().all(|b| matches!(b, b'\r' | b'\n')) {
            continue;
        }

        let text = std::str::from_utf8(&block).map_err(|_| ProtocolError::InvalidUtf8)?;
        return parse_block(text).map(Some);
    }
}

/// Length of the first block in `buf`, up to and including its blank line.
///
/// Lines end at `\r\n`, `\r` or `\n`.
fn find_block_end(buf: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    let mut i = 0;
    while i < buf.len() {
        match buf[i] {
            b'\r' | b'\n' => {
                let mut next = i + 1;
                if buf[i] == b'\r' && buf.get(next) == Some(&b'\n') {
                    next += 1;
                }
                if i == line_start {
                    return Some(next);
                }
                line_start = next;
                i = next;
            }
            _ => i += 1,
        }
    }
    None
}

/// Split text into lines ending at `\r\n`, `\r` or `\n`, keeping empty lines.
fn event_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(text);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.find(&['\r', '\n'][..]) {
            Some(i) => {
                let skip = if current[i..].starts_with("\r\n") { 2 } else { 1 };
                rest = Some(&current[i + skip..]);
                Some(&current[..i])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

fn parse_block(text: &str) -> Result<Message, ProtocolError> {
    let mut id = String::new();
    let mut event = String::new();
    let mut retry = 0;
    let mut data: Option<String> = None;

    for line in event_lines(text) {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "id" => id = value.to_string(),
            "event" => event = value.to_string(),
            "retry" => {
                if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ProtocolError::InvalidRetry(value.to_string()));
                }
                retry = value
                    .parse()
                    .map_err(|_| ProtocolError::InvalidRetry(value.to_string()))?;
            }
            "data" => match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            _ => {}
        }
    }

    Ok(Message::new(id, data.unwrap_or_default(), event).with_retry(retry))
}

/// Codec carrying the server-wide retry stamp.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventCodec {
    retry_ms: u64,
}

impl EventCodec {
    /// Create a codec that stamps `retry_ms` onto every encoded message.
    #[must_use]
    pub fn new(retry_ms: u64) -> Self {
        Self { retry_ms }
    }

    /// The retry stamp in milliseconds.
    #[must_use]
    pub fn retry_ms(&self) -> u64 {
        self.retry_ms
    }

    /// Encode a message with the configured stamp.
    #[must_use]
    pub fn encode(&self, message: &Message) -> Bytes {
        encode_stamped(message, self.retry_ms)
    }

    /// Try to decode one event block from a buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the block is invalid.
    pub fn decode_from(&self, buf: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        decode_from(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_full_message() {
        let message = Message::new("7", "a\nb", "update");
        let encoded = encode_stamped(&message, 3000);
        assert_eq!(
            &encoded[..],
            b"id: 7\nretry: 3000\nevent: update\ndata: a\ndata: b\n\n"
        );
    }

    #[test]
    fn test_encode_empty_message() {
        assert_eq!(&encode(&Message::default())[..], b"\n");
    }

    #[test]
    fn test_stamp_overrides_message_retry() {
        let message = Message::simple("x").with_retry(500);
        assert_eq!(&encode(&message)[..], b"retry: 500\ndata: x\n\n");
        assert_eq!(&encode_stamped(&message, 0)[..], b"data: x\n\n");
        assert_eq!(&encode_stamped(&message, 42)[..], b"retry: 42\ndata: x\n\n");
    }

    #[test]
    fn test_encode_keeps_every_data_line() {
        let message = Message::simple("first\r\nsecond\n\nfourth\n");
        assert_eq!(
            &encode(&message)[..],
            b"data: first\ndata: second\ndata: \ndata: fourth\ndata: \n\n"
        );
    }

    #[test]
    fn test_encode_bare_carriage_return() {
        let message = Message::simple("a\rid: 99");
        assert_eq!(&encode(&message)[..], b"data: a\ndata: id: 99\n\n");

        let mut buf = BytesMut::from(&encode(&message)[..]);
        let decoded = decode_from(&mut buf).unwrap().unwrap();
        assert!(decoded.id().is_empty());
        assert_eq!(decoded.data(), "a\nid: 99");
    }

    #[test]
    fn test_decode_carriage_return_lines() {
        let mut buf = BytesMut::from(&b"data: a\rdata: b\r\rdata: c\r\n\r\n"[..]);

        let first = decode_from(&mut buf).unwrap().unwrap();
        assert_eq!(first.data(), "a\nb");
        let second = decode_from(&mut buf).unwrap().unwrap();
        assert_eq!(second.data(), "c");
        assert!(decode_from(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_crlf_split_after_carriage_return() {
        // The block ends at the second `\r`; its `\n` arrives with the next event.
        let mut buf = BytesMut::from(&b"data: a\r\r"[..]);
        assert_eq!(decode_from(&mut buf).unwrap().unwrap().data(), "a");

        buf.extend_from_slice(b"\ndata: b\n\n");
        assert_eq!(decode_from(&mut buf).unwrap().unwrap().data(), "b");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete() {
        let mut buf = BytesMut::from(&b"id: 1\ndata: partial\n"[..]);
        assert!(decode_from(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 20);
    }

    #[test]
    fn test_streaming_decode() {
        let first = Message::new("1", "one\ntwo", "a");
        let second = Message::heartbeat();

        let mut buf = BytesMut::new();
        encode_into(&first, 2000, &mut buf);
        encode_into(&second, 0, &mut buf);

        let decoded = decode_from(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, first.clone().with_retry(2000));

        let decoded = decode_from(&mut buf).unwrap().unwrap();
        assert!(decoded.is_heartbeat());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_comments_and_unknown_fields() {
        let mut buf = BytesMut::from(&b": keep-alive\nfoo: bar\ndata:tight\r\n\r\n"[..]);
        let decoded = decode_from(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.data(), "tight");
        assert!(decoded.id().is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_invalid_retry() {
        let mut buf = BytesMut::from(&b"retry: soon\n\n"[..]);
        assert!(matches!(
            decode_from(&mut buf),
            Err(ProtocolError::InvalidRetry(value)) if value == "soon"
        ));
    }

    #[test]
    fn test_event_too_large() {
        let mut buf = BytesMut::from(vec![b'x'; MAX_EVENT_SIZE + 1].as_slice());
        assert!(matches!(
            decode_from(&mut buf),
            Err(ProtocolError::EventTooLarge(_))
        ));
    }

    #[test]
    fn test_event_codec_stamps_retry() {
        let codec = EventCodec::new(1000);
        let encoded = codec.encode(&Message::simple("hi"));
        assert_eq!(&encoded[..], b"retry: 1000\ndata: hi\n\n");

        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = codec.decode_from(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.retry(), 1000);
    }
}
