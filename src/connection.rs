//! Writer actor owning the outbound half of a connection.
//!
//! [`ConnectionWriter`] is the only task that writes to a connection. It
//! drains the connection's [`PushQueue`] one message at a time, encoding and
//! flushing each as a complete frame, so producers racing to reach the same
//! client can never interleave partial frames.
//!
//! The writer stops when:
//! - every [`PushHandle`](crate::push::PushHandle) is gone and the queue is empty,
//! - it has written the server shutdown notice,
//! - a write fails, or
//! - the force-close token is cancelled.
//!
//! On every exit path the write half is shut down and dropped.

use futures::SinkExt;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    select,
};
use tokio_util::{codec::FramedWrite, sync::CancellationToken};
use tracing::{debug, warn};

use crate::{
    codec::{CodecError, MessageCodec},
    metrics,
    push::PushQueue,
    registry::ConnectionId,
};

/// Why a [`ConnectionWriter`] stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterExit {
    /// All handles were dropped and the queue was drained.
    Drained,
    /// The server shutdown notice was written; nothing may follow it.
    ShutdownDelivered,
    /// The force-close token fired.
    ForceClosed,
}

/// Actor serialising queued messages onto one connection.
pub struct ConnectionWriter<W> {
    queue: PushQueue,
    sink: FramedWrite<W, MessageCodec>,
    force_close: CancellationToken,
    connection_id: ConnectionId,
}

impl<W> ConnectionWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Create a writer draining `queue` onto `io`.
    #[must_use]
    pub fn new(
        queue: PushQueue,
        io: W,
        codec: MessageCodec,
        force_close: CancellationToken,
        connection_id: ConnectionId,
    ) -> Self {
        Self {
            queue,
            sink: FramedWrite::new(io, codec),
            force_close,
            connection_id,
        }
    }

    /// Deliver queued messages until one of the stop conditions holds.
    ///
    /// # Errors
    ///
    /// Returns the [`CodecError`] that made a write fail. The write half is
    /// still shut down before returning.
    pub async fn run(mut self) -> Result<WriterExit, CodecError> {
        let result = self.pump().await;
        self.queue.close();
        if let Err(e) = self.sink.get_mut().shutdown().await {
            debug!(connection_id = %self.connection_id, error = %e, "write half shutdown failed");
        }
        result
    }

    /// Run the writer, logging instead of returning its outcome.
    pub async fn run_logged(self) {
        let connection_id = self.connection_id;
        match self.run().await {
            Ok(exit) => debug!(%connection_id, ?exit, "connection writer stopped"),
            Err(e) => {
                metrics::inc_errors();
                warn!(%connection_id, error = %e, "connection writer failed");
            }
        }
    }

    async fn pump(&mut self) -> Result<WriterExit, CodecError> {
        loop {
            let msg = select! {
                biased;

                () = self.force_close.cancelled() => return Ok(WriterExit::ForceClosed),
                next = self.queue.recv() => match next {
                    Some(msg) => msg,
                    None => return Ok(WriterExit::Drained),
                },
            };
            let shutdown = msg.is_server_shutdown();
            select! {
                biased;

                () = self.force_close.cancelled() => return Ok(WriterExit::ForceClosed),
                res = self.sink.send(msg) => res?,
            }
            metrics::inc_frames(metrics::Direction::Outbound);
            if shutdown {
                return Ok(WriterExit::ShutdownDelivered);
            }
        }
    }
}
