//! Listener binding for [`RelayServer`].

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use tokio::net::TcpListener;

use crate::server::{Bound, RelayServer, ServerError, ServerState, Unbound};

impl<S> RelayServer<S>
where
    S: ServerState,
{
    fn bind_to_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<RelayServer<Bound>, ServerError> {
        let RelayServer {
            settings,
            shutdown_grace,
            backoff,
            registry,
            ready_tx,
            ..
        } = self;

        std_listener
            .set_nonblocking(true)
            .map_err(ServerError::Bind)?;
        let listener = TcpListener::from_std(std_listener).map_err(ServerError::Bind)?;

        Ok(RelayServer {
            settings,
            shutdown_grace,
            backoff,
            registry,
            ready_tx,
            state: Bound {
                listener: Arc::new(listener),
            },
        })
    }
}

impl RelayServer<Unbound> {
    /// Return `None` as the server is not bound.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier::server::RelayServer;
    ///
    /// assert!(RelayServer::new().local_addr().is_none());
    /// ```
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> { None }

    /// Bind to `addr`.
    ///
    /// Must be called from within a Tokio runtime, which the listener is
    /// registered with.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::net::{Ipv4Addr, SocketAddr};
    ///
    /// use courier::server::RelayServer;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), courier::server::ServerError> {
    /// let server = RelayServer::new().bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;
    /// assert!(server.local_addr().is_some());
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] if the address is in use or otherwise
    /// cannot be bound.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn bind(self, addr: SocketAddr) -> Result<RelayServer<Bound>, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_existing_listener(std_listener)
    }

    /// Adopt an already bound `StdTcpListener`.
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] if the listener cannot be switched to
    /// non-blocking mode or registered with the runtime.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn bind_existing_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<RelayServer<Bound>, ServerError> {
        self.bind_to_listener(std_listener)
    }
}

impl RelayServer<Bound> {
    /// Returns the bound address, or `None` if retrieving it fails.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.state.listener.local_addr().ok() }

    /// Rebind to a fresh address, dropping the current listener.
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] if binding fails.
    pub fn bind(self, addr: SocketAddr) -> Result<Self, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_to_listener(std_listener)
    }
}
