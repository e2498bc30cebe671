//! The relayed message value and the protocol's reserved sentinels.
//!
//! Control frames are not structurally distinct from user traffic: the
//! handshake, client exit and server shutdown are all ordinary messages
//! recognised by their `content`. A user who literally sends `"exiting"`
//! ends their own session. This is the documented wire behaviour and is
//! kept for interoperability.

use std::fmt;

/// Sender name stamped on every server-originated message.
pub const SERVER_NAME: &str = "Server";
/// Content of the first frame a client sends after connecting.
pub const HANDSHAKE_CONTENT: &str = "initial message";
/// Content a client sends to end its session.
pub const CLIENT_EXIT_CONTENT: &str = "exiting";
/// Content of the server's shutdown broadcast.
pub const SHUTDOWN_CONTENT: &str = "exit";

/// One logical message: recipient, sender and UTF-8 text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Message {
    to: String,
    from: String,
    content: String,
}

impl Message {
    /// Build a message from its three fields.
    #[must_use]
    pub fn new(to: impl Into<String>, from: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: from.into(),
            content: content.into(),
        }
    }

    /// Registration announcement binding `username` to the connection.
    #[must_use]
    pub fn handshake(username: impl Into<String>) -> Self {
        Self::new("", username, HANDSHAKE_CONTENT)
    }

    /// Explicit end-of-session notice sent by a client.
    #[must_use]
    pub fn client_exit(username: impl Into<String>) -> Self {
        Self::new("", username, CLIENT_EXIT_CONTENT)
    }

    /// Notice returned to `requester` when `missing` is not registered.
    ///
    /// ```
    /// use courier::message::Message;
    ///
    /// let notice = Message::not_found("alice", "carol");
    /// assert_eq!(notice.to(), "alice");
    /// assert_eq!(notice.from(), "Server");
    /// assert_eq!(notice.content(), "carol not found");
    /// ```
    #[must_use]
    pub fn not_found(requester: impl Into<String>, missing: &str) -> Self {
        Self::new(requester, SERVER_NAME, format!("{missing} not found"))
    }

    /// Not-found notice whose payload fits within `limit` bytes.
    ///
    /// The echoed name is shortened, on a character boundary, as far as
    /// needed. Returns `None` if the notice cannot fit even with the name
    /// left out entirely.
    ///
    /// ```
    /// use courier::message::Message;
    ///
    /// let notice = Message::not_found_within("alice", &"z".repeat(40), 64).expect("fits");
    /// assert!(notice.payload_len() <= 64);
    /// assert!(notice.content().ends_with(" not found"));
    /// ```
    #[must_use]
    pub fn not_found_within(requester: &str, missing: &str, limit: usize) -> Option<Self> {
        let room = limit.checked_sub(Self::not_found(requester, "").payload_len())?;
        let mut end = missing.len().min(room);
        while !missing.is_char_boundary(end) {
            end -= 1;
        }
        Some(Self::not_found(requester, missing.get(..end)?))
    }

    /// Broadcast telling every client the server is going away.
    ///
    /// The recipient is left empty; routing is implicit.
    #[must_use]
    pub fn shutdown_notice() -> Self { Self::new("", SERVER_NAME, SHUTDOWN_CONTENT) }

    /// Recipient username.
    #[must_use]
    pub fn to(&self) -> &str { &self.to }

    /// Sender username.
    #[must_use]
    pub fn from(&self) -> &str { &self.from }

    /// Message text.
    #[must_use]
    pub fn content(&self) -> &str { &self.content }

    /// Split the message into `(to, from, content)`.
    #[must_use]
    pub fn into_parts(self) -> (String, String, String) { (self.to, self.from, self.content) }

    /// Replace the sender with `from`.
    #[must_use]
    pub fn with_sender(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    /// Whether the content is the handshake sentinel.
    #[must_use]
    pub fn is_handshake(&self) -> bool { self.content == HANDSHAKE_CONTENT }

    /// Whether the content is the client-exit sentinel.
    #[must_use]
    pub fn is_client_exit(&self) -> bool { self.content == CLIENT_EXIT_CONTENT }

    /// Whether the content is the shutdown sentinel.
    ///
    /// This checks content only. A user may send `"exit"` too, so receivers
    /// also require the sender to be [`SERVER_NAME`] before treating a frame
    /// as the broadcast; see [`is_server_shutdown`](Self::is_server_shutdown).
    #[must_use]
    pub fn is_shutdown_notice(&self) -> bool { self.content == SHUTDOWN_CONTENT }

    /// Whether this is the server's shutdown broadcast: the shutdown
    /// sentinel sent by [`SERVER_NAME`].
    #[must_use]
    pub fn is_server_shutdown(&self) -> bool {
        self.from == SERVER_NAME && self.is_shutdown_notice()
    }

    /// Encoded payload size: three length prefixes plus the field bytes.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        3 * crate::byte_order::LENGTH_PREFIX_SIZE
            + self.to.len()
            + self.from.len()
            + self.content.len()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.from, self.to, self.content)
    }
}
