//! Length-prefixed framing for [`Message`] values.
//!
//! Wire layout:
//!
//! ```text
//! frame   = u32 payload_len, payload
//! payload = u32 to_len, to, u32 from_len, from, u32 content_len, content
//! ```
//!
//! Every length is big-endian. [`MessageCodec`] plugs into
//! `tokio_util::codec::{FramedRead, FramedWrite}`, which own the buffer that
//! accumulates partial frames between socket reads. Decoding consumes
//! exactly one frame and leaves any further bytes buffered for the next
//! call, so arbitrary TCP segmentation is harmless.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    byte_order::{LENGTH_PREFIX_SIZE, peek_network_u32, write_network_u32},
    message::Message,
};

pub mod error;

pub use error::{CodecError, EofError, Field, FramingError, PayloadError};

/// Smallest accepted frame length limit, in payload bytes.
///
/// Limits passed to [`MessageCodec::new`] are clamped to at least this value.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Largest accepted frame length limit (16 MiB), in payload bytes.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Frame length limit used when none is configured (1 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Tokio codec translating between [`Message`] values and frames.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use courier::{codec::MessageCodec, message::Message};
/// use tokio_util::codec::{Decoder, Encoder};
///
/// let mut codec = MessageCodec::default();
/// let mut buf = BytesMut::new();
/// codec
///     .encode(Message::new("bob", "alice", "hi"), &mut buf)
///     .expect("encode");
///
/// let decoded = codec.decode(&mut buf).expect("decode").expect("whole frame");
/// assert_eq!(decoded.content(), "hi");
/// assert!(buf.is_empty());
/// ```
#[derive(Clone, Copy, Debug)]
pub struct MessageCodec {
    max_frame_length: usize,
}

impl MessageCodec {
    /// Construct a codec that rejects payloads longer than `max_frame_length`.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: clamp_frame_length(max_frame_length),
        }
    }

    /// Return the maximum payload length accepted by this codec.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    fn check_length(&self, size: usize) -> Result<(), FramingError> {
        if size > self.max_frame_length {
            return Err(FramingError::OversizedFrame {
                size,
                max: self.max_frame_length,
            });
        }
        Ok(())
    }

    fn write_frame(&self, item: &Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        let len = item.payload_len();
        self.check_length(len)?;
        let prefix = u32::try_from(len).map_err(|_| FramingError::OversizedFrame {
            size: len,
            max: self.max_frame_length,
        })?;
        dst.reserve(LENGTH_PREFIX_SIZE + len);
        dst.put_slice(&write_network_u32(prefix));
        put_fields(item, dst)?;
        Ok(())
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(declared) = peek_network_u32(&src[..]) else {
            src.reserve(LENGTH_PREFIX_SIZE);
            return Ok(None);
        };
        let len = usize::try_from(declared).unwrap_or(usize::MAX);
        // Reject before buffering so a hostile prefix cannot force a large
        // allocation.
        self.check_length(len)?;

        let frame_len = LENGTH_PREFIX_SIZE + len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let payload = src.split_to(len).freeze();
        Ok(Some(decode_payload(payload)?))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Clean close: nothing buffered at a frame boundary.
        if src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => Err(build_eof_error(src).into()),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.write_frame(&item, dst)
    }
}

/// Classify a stream that ended with `src` still holding a partial frame.
fn build_eof_error(src: &BytesMut) -> EofError {
    match peek_network_u32(&src[..]) {
        Some(expected) => EofError::MidFrame {
            bytes_received: src.len().saturating_sub(LENGTH_PREFIX_SIZE),
            expected: usize::try_from(expected).unwrap_or(usize::MAX),
        },
        None => EofError::MidHeader {
            bytes_received: src.len(),
            header_size: LENGTH_PREFIX_SIZE,
        },
    }
}

fn put_field(dst: &mut BytesMut, field: Field, value: &str) -> Result<(), FramingError> {
    let len = u32::try_from(value.len()).map_err(|_| FramingError::FieldTooLong {
        field,
        len: value.len(),
    })?;
    dst.put_slice(&write_network_u32(len));
    dst.put_slice(value.as_bytes());
    Ok(())
}

fn put_fields(item: &Message, dst: &mut BytesMut) -> Result<(), FramingError> {
    put_field(dst, Field::To, item.to())?;
    put_field(dst, Field::From, item.from())?;
    put_field(dst, Field::Content, item.content())
}

/// Serialise the three fields of `item` without the outer frame prefix.
///
/// # Errors
///
/// Returns [`FramingError::FieldTooLong`] if a field exceeds `u32::MAX` bytes.
pub fn encode_payload(item: &Message) -> Result<Bytes, FramingError> {
    let mut buf = BytesMut::with_capacity(item.payload_len());
    put_fields(item, &mut buf)?;
    Ok(buf.freeze())
}

fn take_field(buf: &mut Bytes, field: Field) -> Result<String, PayloadError> {
    let Some(len) = peek_network_u32(&buf[..]) else {
        return Err(PayloadError::Truncated {
            field,
            needed: LENGTH_PREFIX_SIZE,
            available: buf.len(),
        });
    };
    buf.advance(LENGTH_PREFIX_SIZE);
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    if buf.len() < len {
        return Err(PayloadError::Truncated {
            field,
            needed: len,
            available: buf.len(),
        });
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| PayloadError::InvalidUtf8 { field })
}

/// Parse a frame payload into a [`Message`].
///
/// # Errors
///
/// Returns a [`PayloadError`] if a field is truncated or not UTF-8, or if
/// bytes remain after the content field.
pub fn decode_payload(mut payload: Bytes) -> Result<Message, PayloadError> {
    let to = take_field(&mut payload, Field::To)?;
    let from = take_field(&mut payload, Field::From)?;
    let content = take_field(&mut payload, Field::Content)?;
    if !payload.is_empty() {
        return Err(PayloadError::TrailingBytes {
            count: payload.len(),
        });
    }
    Ok(Message::new(to, from, content))
}
