//! Builder configuration for [`RelayServer`].

use std::{sync::Arc, time::Duration};

use tokio::sync::oneshot;

use super::{BackoffConfig, RelayServer, ServerState, Unbound};
use crate::{codec::clamp_frame_length, registry::Registry, session::SessionSettings};

mod binding;

/// Default time sessions get to wind down after the shutdown notice.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

impl RelayServer<Unbound> {
    /// Create an unbound server with default limits and an empty registry.
    ///
    /// Call [`bind`](Self::bind) before running the server.
    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: SessionSettings::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            backoff: BackoffConfig::default(),
            registry: Arc::new(Registry::new()),
            ready_tx: None,
            state: Unbound,
        }
    }
}

impl Default for RelayServer<Unbound> {
    fn default() -> Self { Self::new() }
}

impl<S> RelayServer<S>
where
    S: ServerState,
{
    /// Set how many messages may queue for one slow client. Values below
    /// one are raised to one.
    #[must_use]
    pub fn outbox_capacity(mut self, capacity: usize) -> Self {
        self.settings.outbox_capacity = capacity.max(1);
        self
    }

    /// Set the largest frame payload accepted or sent.
    ///
    /// The value is clamped to the codec's supported range.
    #[must_use]
    pub fn max_frame_length(mut self, length: usize) -> Self {
        self.settings.max_frame_length = clamp_frame_length(length);
        self
    }

    /// Close connections that do not send their handshake within `limit`.
    #[must_use]
    pub fn handshake_timeout(mut self, limit: Duration) -> Self {
        self.settings.handshake_timeout = Some(limit);
        self
    }

    /// Set how long sessions may keep running after the shutdown notice
    /// before they are force-closed.
    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Configure the accept-loop retry delays.
    ///
    /// The configuration is normalised: zero delays become one millisecond
    /// and inverted bounds are swapped.
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// Request a notification once the server has started accepting.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Limits applied to each connection session.
    #[must_use]
    pub const fn session_settings(&self) -> SessionSettings { self.settings }

    /// Configured shutdown grace period.
    #[must_use]
    pub const fn grace(&self) -> Duration { self.shutdown_grace }

    /// Configured accept-loop back-off.
    #[must_use]
    pub const fn backoff(&self) -> BackoffConfig { self.backoff }

    /// Shared handle to the username registry.
    #[must_use]
    pub fn registry(&self) -> Arc<Registry> { Arc::clone(&self.registry) }
}
