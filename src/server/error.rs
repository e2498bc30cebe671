//! Errors raised by [`RelayServer`](super::RelayServer) operations.

use std::io;

use thiserror::Error;

/// Errors that stop the relay server from starting.
///
/// Once the server runs, per-connection failures are confined to their
/// sessions and accept failures are retried, so nothing else surfaces here.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound or configured.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
}
