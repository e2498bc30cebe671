//! Session error taxonomy.
//!
//! None of these errors reach the relay coordinator: each ends only the
//! session that hit it. A missing recipient is not an error at all; it is
//! reported to the sender as an ordinary not-found message. Duplicate
//! usernames are not rejected either; the later registration wins.

use std::io;

use thiserror::Error;

use crate::{codec::CodecError, push::PushConfigError};

/// Reasons a connection session terminates abnormally.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The connection was reset, closed mid-frame, or otherwise failed.
    #[error("transport error: {0}")]
    Transport(#[source] CodecError),

    /// The peer sent bytes that do not form a valid frame. The stream cannot
    /// be resynchronised, so the session ends rather than guess.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[source] CodecError),

    /// The handshake frame did not arrive within the configured limit.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// The handshake named an empty username.
    #[error("handshake carried an empty username")]
    EmptyUsername,

    /// The handshake claimed the name the server uses for its own notices.
    #[error("username {0:?} is reserved")]
    ReservedUsername(String),

    /// The outbound queue could not be created.
    #[error("outbound queue: {0}")]
    Outbox(#[from] PushConfigError),
}

impl SessionError {
    /// Sort a codec failure into transport or protocol trouble.
    #[must_use]
    pub fn classify(err: CodecError) -> Self {
        if err.is_malformed() {
            Self::MalformedFrame(err)
        } else {
            Self::Transport(err)
        }
    }

    /// Whether the error came from the peer breaking the wire format.
    #[must_use]
    pub fn is_malformed(&self) -> bool { matches!(self, Self::MalformedFrame(_)) }
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self { Self::classify(err) }
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self { Self::Transport(CodecError::Io(err)) }
}
