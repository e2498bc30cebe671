//! Error types for relay client operations.

use std::io;

use crate::codec::CodecError;

/// Errors emitted by [`RelayClient`](super::RelayClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connecting to the server failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// A frame could not be encoded, or the server sent one that does not
    /// decode.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// Usernames must not be empty.
    #[error("username must not be empty")]
    EmptyUsername,
}
