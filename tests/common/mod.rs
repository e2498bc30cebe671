//! Shared utilities for integration tests.
//!
//! Starts a relay server on an unused local port and connects clients to
//! it, waiting until each username is actually registered.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
    time::Duration,
};

use courier::{
    client::{ClientEvent, RelayClient},
    message::Message,
    registry::Registry,
    server::{RelayServer, ServerError, Unbound},
};
use tokio::{sync::oneshot, task::JoinHandle, time::timeout};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// How long any single step of a test may take before it fails.
pub const STEP: Duration = Duration::from_secs(2);

/// Create a TCP listener bound to a free local port.
pub fn unused_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("failed to bind port")
}

/// A relay server running in the background.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub registry: Arc<Registry>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    /// Bind `server` to a free port and run it until [`stop`](Self::stop).
    pub async fn start(server: RelayServer<Unbound>) -> TestResult<Self> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = server
            .ready_signal(ready_tx)
            .bind_existing_listener(unused_listener())?;
        let addr = server.local_addr().ok_or("bound server has no address")?;
        let registry = server.registry();
        let handle = tokio::spawn(server.run_with_shutdown(async {
            let _ = stop_rx.await;
        }));
        timeout(STEP, ready_rx).await??;
        Ok(Self {
            addr,
            registry,
            stop: Some(stop_tx),
            handle,
        })
    }

    /// Start a server with default settings.
    pub async fn start_default() -> TestResult<Self> { Self::start(RelayServer::new()).await }

    /// Connect and register `username`, returning once the server has
    /// recorded the registration.
    pub async fn connect(&self, username: &str) -> TestResult<RelayClient> {
        let client = RelayClient::connect(self.addr, username).await?;
        self.wait_registered(username).await?;
        Ok(client)
    }

    /// Wait until `username` resolves in the registry.
    pub async fn wait_registered(&self, username: &str) -> TestResult {
        self.wait_until(|registry| registry.lookup(username).is_some())
            .await
    }

    /// Wait until `username` no longer resolves in the registry.
    pub async fn wait_unregistered(&self, username: &str) -> TestResult {
        self.wait_until(|registry| registry.lookup(username).is_none())
            .await
    }

    async fn wait_until(&self, condition: impl Fn(&Registry) -> bool) -> TestResult {
        timeout(STEP, async {
            while !condition(&self.registry) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await?;
        Ok(())
    }

    /// Trigger shutdown without waiting for it to finish.
    pub fn trigger_shutdown(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }

    /// Trigger shutdown and wait for the server to return.
    pub async fn stop(mut self) -> TestResult {
        self.trigger_shutdown();
        timeout(STEP * 5, self.handle).await???;
        Ok(())
    }

    /// Handle to the server task, for tests that drive shutdown themselves.
    pub fn into_handle(mut self) -> JoinHandle<Result<(), ServerError>> {
        self.trigger_shutdown();
        self.handle
    }
}

/// Read the next event, failing if none arrives in time.
pub async fn next_event(client: &mut RelayClient) -> TestResult<ClientEvent> {
    timeout(STEP, client.recv())
        .await??
        .ok_or_else(|| "connection closed unexpectedly".into())
}

/// Read the next event and require it to be a delivered message.
pub async fn next_message(client: &mut RelayClient) -> TestResult<Message> {
    match next_event(client).await? {
        ClientEvent::Delivered(msg) => Ok(msg),
        ClientEvent::Shutdown => Err("unexpected shutdown notice".into()),
    }
}
