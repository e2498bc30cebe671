#![doc(html_root_url = "https://docs.rs/courier/latest")]
//! Public API for the `courier` library.
//!
//! `courier` is a point-to-point message relay. Clients register a username
//! over a persistent TCP connection, then send length-prefixed messages
//! addressed to other usernames; the server forwards each message to the
//! connection currently registered under the recipient's name, or answers
//! the sender with a not-found notice.

pub mod byte_order;
pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod message;
pub mod metrics;
pub mod push;
pub mod registry;
pub mod server;
pub mod session;

pub use client::{ClientError, ClientEvent, RelayClient};
pub use codec::{CodecError, MessageCodec};
pub use error::SessionError;
pub use message::Message;
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use registry::{ConnectionId, Registry};
pub use server::{RelayServer, ServerError};
