//! Error types for the frame codec.
//!
//! Failures fall into four categories:
//!
//! - [`FramingError`]: the outer length prefix cannot be honoured.
//! - [`PayloadError`]: a complete frame arrived but its three length-prefixed fields do not parse.
//! - [`EofError`]: the peer closed the stream part-way through a frame.
//! - [`CodecError::Io`]: the transport itself failed.
//!
//! Framing and payload failures mean the stream can no longer be trusted to
//! resynchronise; [`CodecError::is_malformed`] identifies them.

use std::{fmt, io};

use thiserror::Error;

/// Payload field, in wire order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    /// Recipient username.
    To,
    /// Sender username.
    From,
    /// Message text.
    Content,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::To => "to",
            Self::From => "from",
            Self::Content => "content",
        })
    }
}

/// Errors raised while honouring the outer frame length.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The frame length exceeds the configured maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Declared or encoded frame length.
        size: usize,
        /// Maximum allowed frame length.
        max: usize,
    },

    /// A single field is longer than a `u32` length prefix can describe.
    #[error("{field} field too long to encode: {len} bytes")]
    FieldTooLong {
        /// Offending field.
        field: Field,
        /// Field length in bytes.
        len: usize,
    },
}

/// Errors raised while splitting a frame payload into its fields.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    /// The payload ended before the field (or its prefix) was complete.
    #[error("{field} field truncated: need {needed} bytes, have {available}")]
    Truncated {
        /// Field being read.
        field: Field,
        /// Bytes required to finish the read.
        needed: usize,
        /// Bytes remaining in the payload.
        available: usize,
    },

    /// The field bytes are not valid UTF-8.
    #[error("{field} field is not valid UTF-8")]
    InvalidUtf8 {
        /// Offending field.
        field: Field,
    },

    /// Bytes remained after the content field.
    #[error("{count} trailing bytes after content field")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },
}

/// The peer closed the stream before a frame was complete.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// EOF while reading the 4-byte length prefix.
    #[error("premature EOF during header: {bytes_received} of {header_size} header bytes")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Expected header size.
        header_size: usize,
    },

    /// EOF after the length prefix but before the payload was complete.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte frame received")]
    MidFrame {
        /// Payload bytes received before EOF.
        bytes_received: usize,
        /// Payload length announced by the prefix.
        expected: usize,
    },
}

/// Top-level codec error.
///
/// # Examples
///
/// ```
/// use courier::codec::{CodecError, EofError, FramingError};
///
/// let err = CodecError::Framing(FramingError::OversizedFrame {
///     size: 2000,
///     max: 1024,
/// });
/// assert!(err.is_malformed());
///
/// let err = CodecError::Eof(EofError::MidFrame {
///     bytes_received: 3,
///     expected: 10,
/// });
/// assert!(!err.is_malformed());
/// ```
#[derive(Debug, Error)]
pub enum CodecError {
    /// Outer frame length could not be honoured.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Frame payload did not parse.
    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),

    /// Transport layer I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Stream ended mid-frame.
    #[error("EOF: {0}")]
    Eof(#[from] EofError),
}

impl CodecError {
    /// Whether the bytes on the wire violate the protocol.
    ///
    /// I/O failures and premature EOF are transport problems, not malformed
    /// frames.
    #[must_use]
    pub fn is_malformed(&self) -> bool { matches!(self, Self::Framing(_) | Self::Payload(_)) }

    /// Error category for logging and metrics.
    ///
    /// One of `"framing"`, `"payload"`, `"io"` or `"eof"`.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Payload(_) => "payload",
            Self::Io(_) => "io",
            Self::Eof(_) => "eof",
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::Framing(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Payload(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Eof(e) => io::Error::new(io::ErrorKind::UnexpectedEof, e),
        }
    }
}
