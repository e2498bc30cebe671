//! Outbound queue feeding a single connection.
//!
//! Each registered connection owns one [`PushQueue`], drained by its
//! [`ConnectionWriter`](crate::connection::ConnectionWriter). Any task that
//! needs to deliver a message to that connection holds a cloneable
//! [`PushHandle`]. Because only the writer touches the socket, frames pushed
//! concurrently by different sessions are written whole and never
//! interleave. Messages from one producer are delivered in push order.

use std::sync::{
    Arc,
    Weak,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::mpsc;
use tracing::debug;

use crate::{message::Message, registry::ConnectionId};

/// Errors that can occur when pushing a message.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PushError {
    /// The connection's writer has stopped; the message was not queued.
    #[error("push queue closed")]
    Closed,
}

/// Errors returned when creating push queues.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PushConfigError {
    /// Queues must hold at least one message.
    #[error("invalid queue capacity {0}; must be at least 1")]
    InvalidCapacity(usize),
}

/// Shared state behind every clone of a [`PushHandle`].
pub(crate) struct PushHandleInner {
    tx: mpsc::Sender<Message>,
    connection_id: ConnectionId,
    shutdown_notified: AtomicBool,
}

/// Cloneable write handle for one connection.
#[derive(Clone)]
pub struct PushHandle(Arc<PushHandleInner>);

impl std::fmt::Debug for PushHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushHandle")
            .field("connection_id", &self.0.connection_id)
            .field("closed", &self.0.tx.is_closed())
            .finish()
    }
}

impl PushHandle {
    pub(crate) fn from_arc(arc: Arc<PushHandleInner>) -> Self { Self(arc) }

    pub(crate) fn downgrade(&self) -> Weak<PushHandleInner> { Arc::downgrade(&self.0) }

    /// Connection this handle writes to.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId { self.0.connection_id }

    /// Whether the connection's writer has stopped accepting messages.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.0.tx.is_closed() }

    /// Resolve once the connection's writer has stopped.
    pub async fn closed(&self) { self.0.tx.closed().await; }

    /// Queue `msg` for delivery, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if the writer has stopped.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier::{message::Message, push::PushQueue, registry::ConnectionId};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let (mut queue, handle) = PushQueue::bounded(4, ConnectionId::new(1)).expect("queue");
    /// handle
    ///     .push(Message::new("bob", "alice", "hi"))
    ///     .await
    ///     .expect("push");
    /// assert_eq!(queue.recv().await.map(|m| m.content().to_owned()), Some("hi".into()));
    /// # }
    /// ```
    pub async fn push(&self, msg: Message) -> Result<(), PushError> {
        self.0.tx.send(msg).await.map_err(|_| PushError::Closed)?;
        debug!(connection_id = %self.0.connection_id, "message queued");
        Ok(())
    }

    /// Queue the shutdown notice unless this connection already received it.
    ///
    /// Returns `Ok(true)` when the notice was queued by this call and
    /// `Ok(false)` when an earlier call already queued it.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if the writer has stopped.
    pub async fn notify_shutdown(&self) -> Result<bool, PushError> {
        if self.0.shutdown_notified.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.push(Message::shutdown_notice()).await?;
        Ok(true)
    }
}

/// Receiving side of a connection's outbound queue.
pub struct PushQueue {
    rx: mpsc::Receiver<Message>,
}

impl PushQueue {
    /// Create a queue holding up to `capacity` messages, plus its handle.
    ///
    /// # Errors
    ///
    /// Returns [`PushConfigError::InvalidCapacity`] if `capacity` is zero.
    pub fn bounded(
        capacity: usize,
        connection_id: ConnectionId,
    ) -> Result<(Self, PushHandle), PushConfigError> {
        if capacity == 0 {
            return Err(PushConfigError::InvalidCapacity(capacity));
        }
        let (tx, rx) = mpsc::channel(capacity);
        let inner = PushHandleInner {
            tx,
            connection_id,
            shutdown_notified: AtomicBool::new(false),
        };
        Ok((Self { rx }, PushHandle(Arc::new(inner))))
    }

    /// Receive the next queued message.
    ///
    /// Returns `None` once every handle is dropped and the queue is empty.
    pub async fn recv(&mut self) -> Option<Message> { self.rx.recv().await }

    /// Stop accepting new messages; already queued ones can still be received.
    pub fn close(&mut self) { self.rx.close(); }
}
