//! Client side of the relay protocol.
//!
//! [`RelayClient`] is the minimal transport contract a client needs to
//! interoperate with the server: send the handshake, send addressed
//! messages, read delivered frames, and recognise the shutdown notice.
//! Reading input lines and rendering output are left to the caller.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_util::codec::Framed;

use crate::{codec::MessageCodec, message::Message};

mod error;

pub use error::ClientError;

/// What a call to [`RelayClient::recv`] produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// A message relayed from another user, or a server notice such as
    /// "bob not found".
    Delivered(Message),
    /// The server is shutting down; the caller should stop its receive loop.
    Shutdown,
}

/// Stream types a [`RelayClient`] can run over.
pub trait ClientStream: AsyncRead + AsyncWrite + Unpin {}
impl<T> ClientStream for T where T: AsyncRead + AsyncWrite + Unpin {}

/// A registered connection to the relay server.
///
/// # Examples
///
/// ```no_run
/// use std::net::SocketAddr;
///
/// use courier::client::{ClientEvent, RelayClient};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), courier::client::ClientError> {
/// let addr: SocketAddr = "127.0.0.1:7000".parse().expect("valid socket address");
/// let mut client = RelayClient::connect(addr, "alice").await?;
/// client.send("bob", "hi").await?;
/// while let Some(event) = client.recv().await? {
///     match event {
///         ClientEvent::Delivered(msg) => println!("{msg}"),
///         ClientEvent::Shutdown => break,
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct RelayClient<T = TcpStream>
where
    T: ClientStream,
{
    username: String,
    framed: Framed<T, MessageCodec>,
}

impl RelayClient<TcpStream> {
    /// Connect to `addr` and register as `username`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the connection is refused, or a
    /// codec error if the handshake cannot be written.
    pub async fn connect(addr: SocketAddr, username: impl Into<String>) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Self::handshake(stream, username).await
    }
}

impl<T> RelayClient<T>
where
    T: ClientStream,
{
    /// Register as `username` over an already open stream.
    ///
    /// The server gives no acknowledgement; the client counts as
    /// registered once the server has read the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptyUsername`] for an empty name, or the
    /// transport error if the handshake cannot be written.
    pub async fn handshake(stream: T, username: impl Into<String>) -> Result<Self, ClientError> {
        Self::handshake_with_codec(stream, username, MessageCodec::default()).await
    }

    /// Register as `username` using a codec with a custom frame limit.
    ///
    /// # Errors
    ///
    /// See [`handshake`](Self::handshake).
    pub async fn handshake_with_codec(
        stream: T,
        username: impl Into<String>,
        codec: MessageCodec,
    ) -> Result<Self, ClientError> {
        let username = username.into();
        if username.is_empty() {
            return Err(ClientError::EmptyUsername);
        }
        let mut framed = Framed::new(stream, codec);
        framed.send(Message::handshake(username.as_str())).await?;
        Ok(Self { username, framed })
    }

    /// Username this client registered with.
    #[must_use]
    pub fn username(&self) -> &str { &self.username }

    /// Send `content` to the user named `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be encoded or written.
    pub async fn send(&mut self, to: &str, content: &str) -> Result<(), ClientError> {
        let msg = Message::new(to, self.username.as_str(), content);
        self.send_message(msg).await
    }

    /// Send a fully formed message. The server replaces `from` with the
    /// registered username.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be encoded or written.
    pub async fn send_message(&mut self, msg: Message) -> Result<(), ClientError> {
        self.framed.send(msg).await?;
        Ok(())
    }

    /// Wait for the next frame from the server.
    ///
    /// Returns `Ok(None)` once the server has closed the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails or carries a malformed frame.
    pub async fn recv(&mut self) -> Result<Option<ClientEvent>, ClientError> {
        match self.framed.next().await {
            Some(Ok(msg)) if msg.is_server_shutdown() => {
                Ok(Some(ClientEvent::Shutdown))
            }
            Some(Ok(msg)) => Ok(Some(ClientEvent::Delivered(msg))),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Tell the server this client is leaving, then close the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the exit frame cannot be written or the stream
    /// cannot be closed.
    pub async fn exit(mut self) -> Result<(), ClientError> {
        let msg = Message::client_exit(self.username.as_str());
        self.framed.send(msg).await?;
        self.framed.close().await?;
        Ok(())
    }

    /// Consume the client, returning the underlying stream.
    #[must_use]
    pub fn into_inner(self) -> T { self.framed.into_inner() }
}
