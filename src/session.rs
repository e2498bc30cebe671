//! Per-connection session state machine.
//!
//! ```text
//! AwaitingHandshake --handshake--> Active --exit / EOF / error / writer stop--> Closing --> Closed
//!         \------------------ EOF / error / timeout --------------------------------------/
//! ```
//!
//! A session owns the read half of its connection and is the only reader.
//! On registration it spawns a [`ConnectionWriter`] for the write half and
//! publishes a [`PushHandle`] to the [`Registry`]. Messages read while
//! `Active` are routed to the recipient's handle, or answered with a
//! not-found notice on the sender's own handle. Frames from one client are
//! processed one at a time, which preserves per-sender ordering.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::StreamExt;
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf},
    select,
    time::timeout,
};
use tokio_util::{codec::FramedRead, sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    codec::{DEFAULT_MAX_FRAME_LENGTH, FramingError, MessageCodec},
    connection::ConnectionWriter,
    error::SessionError,
    message::{Message, SERVER_NAME},
    metrics,
    push::{PushHandle, PushQueue},
    registry::{ConnectionId, Registry},
};

/// Default number of messages buffered for a slow client.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

/// Lifecycle of a connection session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the registration frame.
    AwaitingHandshake,
    /// Registered and routing frames.
    Active,
    /// Unregistering and releasing the connection.
    Closing,
    /// Terminal.
    Closed,
}

/// Per-session limits, fixed when the server is bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    /// Messages buffered per connection before pushers wait.
    pub outbox_capacity: usize,
    /// Largest frame payload accepted or sent.
    pub max_frame_length: usize,
    /// Limit on the wait for the handshake frame.
    pub handshake_timeout: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            handshake_timeout: None,
        }
    }
}

/// Everything a session shares with the coordinator.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub registry: Arc<Registry>,
    pub settings: SessionSettings,
    /// Cancelled once shutdown has begun.
    pub draining: CancellationToken,
    /// Cancelled when the grace period ends.
    pub force_close: CancellationToken,
    /// Tracks writer tasks so shutdown can wait for them.
    pub tracker: TaskTracker,
}

enum Inbound {
    Frame(Message),
    Closed,
    ForceClosed,
    WriterStopped,
    Failed(SessionError),
}

pub(crate) struct Session<S> {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    state: SessionState,
    username: Option<String>,
    reader: FramedRead<ReadHalf<S>, MessageCodec>,
    write_half: Option<WriteHalf<S>>,
    outbox: Option<PushHandle>,
    ctx: SessionContext,
}

/// Drive one accepted connection until its session is closed.
pub(crate) async fn serve_connection<S>(stream: S, peer: Option<SocketAddr>, ctx: SessionContext)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    Session::new(stream, peer, ctx).run().await;
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub(crate) fn new(stream: S, peer: Option<SocketAddr>, ctx: SessionContext) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let codec = MessageCodec::new(ctx.settings.max_frame_length);
        Self {
            id: ConnectionId::next(),
            peer,
            state: SessionState::AwaitingHandshake,
            username: None,
            reader: FramedRead::new(read_half, codec),
            write_half: Some(write_half),
            outbox: None,
            ctx,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(connection_id = %self.id, peer = ?self.peer, "session started");
        loop {
            let next = match self.state {
                SessionState::AwaitingHandshake => self.await_handshake().await,
                SessionState::Active => self.step().await,
                SessionState::Closing => self.close(),
                SessionState::Closed => break,
            };
            if next != self.state {
                debug!(connection_id = %self.id, from = ?self.state, to = ?next, "session transition");
            }
            self.state = next;
        }
    }

    async fn next_frame(&mut self) -> Inbound {
        let force_close = &self.ctx.force_close;
        let outbox = self.outbox.as_ref();
        let reader = &mut self.reader;
        select! {
            biased;

            () = force_close.cancelled() => Inbound::ForceClosed,
            () = writer_stopped(outbox) => Inbound::WriterStopped,
            next = reader.next() => match next {
                Some(Ok(msg)) => {
                    metrics::inc_frames(metrics::Direction::Inbound);
                    Inbound::Frame(msg)
                }
                Some(Err(e)) => Inbound::Failed(SessionError::from(e)),
                None => Inbound::Closed,
            },
        }
    }

    async fn await_handshake(&mut self) -> SessionState {
        let inbound = match self.ctx.settings.handshake_timeout {
            Some(limit) => timeout(limit, self.next_frame())
                .await
                .unwrap_or_else(|_| Inbound::Failed(SessionError::HandshakeTimeout)),
            None => self.next_frame().await,
        };
        match inbound {
            Inbound::Frame(hello) => {
                let (_, username, _) = hello.into_parts();
                match self.register(username).await {
                    Ok(()) => SessionState::Active,
                    Err(e) => {
                        self.report(&e);
                        SessionState::Closed
                    }
                }
            }
            Inbound::Closed | Inbound::ForceClosed | Inbound::WriterStopped => {
                debug!(connection_id = %self.id, peer = ?self.peer, "closed before handshake");
                SessionState::Closed
            }
            Inbound::Failed(e) => {
                self.report(&e);
                SessionState::Closed
            }
        }
    }

    async fn register(&mut self, username: String) -> Result<(), SessionError> {
        if username.is_empty() {
            return Err(SessionError::EmptyUsername);
        }
        if username == SERVER_NAME {
            return Err(SessionError::ReservedUsername(username));
        }
        let (queue, handle) = PushQueue::bounded(self.ctx.settings.outbox_capacity, self.id)?;
        if let Some(io) = self.write_half.take() {
            let writer = ConnectionWriter::new(
                queue,
                io,
                *self.reader.decoder(),
                self.ctx.force_close.clone(),
                self.id,
            );
            self.ctx.tracker.spawn(writer.run_logged());
        }

        let displaced = self.ctx.registry.register(username.as_str(), &handle);
        metrics::inc_registered();
        match displaced {
            Some(previous) => {
                metrics::dec_registered();
                info!(
                    connection_id = %self.id,
                    %username,
                    displaced = %previous,
                    "user registered, replacing earlier connection"
                );
            }
            None => info!(connection_id = %self.id, %username, peer = ?self.peer, "user registered"),
        }

        // Shutdown may have begun after the coordinator's snapshot; the
        // handle deduplicates against the broadcast.
        if self.ctx.draining.is_cancelled()
            && let Err(e) = handle.notify_shutdown().await
        {
            debug!(connection_id = %self.id, error = %e, "late shutdown notice not queued");
        }

        self.username = Some(username);
        self.outbox = Some(handle);
        Ok(())
    }

    async fn step(&mut self) -> SessionState {
        match self.next_frame().await {
            Inbound::Frame(msg) if msg.is_client_exit() => {
                debug!(connection_id = %self.id, "client requested exit");
                SessionState::Closing
            }
            Inbound::Frame(msg) => self.route(msg).await,
            Inbound::Closed => {
                debug!(connection_id = %self.id, "client disconnected");
                SessionState::Closing
            }
            Inbound::ForceClosed => {
                debug!(connection_id = %self.id, "session force-closed");
                SessionState::Closing
            }
            Inbound::WriterStopped => {
                debug!(connection_id = %self.id, "outbound writer stopped");
                SessionState::Closing
            }
            Inbound::Failed(e) => {
                self.report(&e);
                SessionState::Closing
            }
        }
    }

    async fn route(&self, msg: Message) -> SessionState {
        let (Some(sender), Some(outbox)) = (self.username.as_deref(), self.outbox.as_ref()) else {
            return SessionState::Closing;
        };
        if msg.from() != sender {
            debug!(connection_id = %self.id, claimed = msg.from(), sender, "restamping sender");
        }
        let msg = msg.with_sender(sender);
        // Restamping can push the frame past the limit every writer enforces.
        let limit = self.reader.decoder().max_frame_length();
        let size = msg.payload_len();
        if size > limit {
            let err = FramingError::OversizedFrame { size, max: limit };
            self.report(&SessionError::MalformedFrame(err.into()));
            return SessionState::Closing;
        }

        if let Some(dest) = self.ctx.registry.lookup(msg.to()) {
            let to = msg.to().to_owned();
            // A dead destination is its own session's problem.
            if let Err(e) = dest.push(msg).await {
                warn!(connection_id = %self.id, sender, %to, error = %e, "relay to recipient failed");
            }
            return SessionState::Active;
        }

        metrics::inc_route_misses();
        debug!(connection_id = %self.id, sender, to = msg.to(), "recipient not found");
        let Some(notice) = Message::not_found_within(sender, msg.to(), limit) else {
            warn!(connection_id = %self.id, sender, "not-found notice exceeds frame limit");
            return SessionState::Active;
        };
        match outbox.push(notice).await {
            Ok(()) => SessionState::Active,
            Err(e) => {
                debug!(connection_id = %self.id, error = %e, "own writer stopped");
                SessionState::Closing
            }
        }
    }

    fn close(&mut self) -> SessionState {
        if let Some(username) = self.username.take() {
            let removed = self.ctx.registry.unregister_connection(&username, self.id);
            if removed {
                metrics::dec_registered();
            }
            info!(connection_id = %self.id, %username, removed, "user unregistered");
        }
        // Dropping the last strong handle lets the writer drain and close.
        self.outbox = None;
        self.write_half = None;
        SessionState::Closed
    }

    fn report(&self, err: &SessionError) {
        match err {
            SessionError::Transport(e) => {
                info!(connection_id = %self.id, peer = ?self.peer, error = %e, "connection lost");
            }
            _ => {
                metrics::inc_errors();
                warn!(connection_id = %self.id, peer = ?self.peer, error = %err, "session terminated");
            }
        }
    }
}

/// Resolve when the connection's writer stops, after delivering the
/// shutdown notice or failing a write. Never resolves before registration.
async fn writer_stopped(outbox: Option<&PushHandle>) {
    match outbox {
        Some(handle) => handle.closed().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests;
