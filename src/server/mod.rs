//! Relay coordinator.
//!
//! [`RelayServer`] owns the listening socket and the [`Registry`]. Running
//! it spawns one accept task; every accepted connection gets its own
//! session task. When the shutdown trigger fires the coordinator stops
//! accepting, sends the shutdown notice to every registered connection,
//! waits up to the grace period for sessions to end on their own, and then
//! force-closes whatever remains.

use std::{sync::Arc, time::Duration};

use tokio::{net::TcpListener, sync::oneshot};

use crate::{registry::Registry, session::SessionSettings};

/// Relay coordinator.
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// (not yet bound to a TCP listener) or [`Bound`]. New servers start
/// `Unbound` and must call [`RelayServer::bind`] or
/// [`RelayServer::bind_existing_listener`] before running.
///
/// # Examples
///
/// ```no_run
/// use std::net::{Ipv4Addr, SocketAddr};
///
/// use courier::server::RelayServer;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), courier::server::ServerError> {
/// let server = RelayServer::new().bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 7000)))?;
/// server.run().await
/// # }
/// ```
pub struct RelayServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) settings: SessionSettings,
    pub(crate) shutdown_grace: Duration,
    pub(crate) backoff: BackoffConfig,
    pub(crate) registry: Arc<Registry>,
    /// Single-use readiness notification, sent once the accept task runs.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    /// Typestate tracking whether the server has been bound to a listener.
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod config;
pub use config::DEFAULT_SHUTDOWN_GRACE;
mod connection;
pub mod error;
pub use error::ServerError;
mod runtime;
pub use runtime::BackoffConfig;

#[cfg(test)]
pub(crate) mod test_util;
