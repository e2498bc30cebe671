//! Runtime control for [`RelayServer`].

mod accept;
mod backoff;
mod shutdown;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::Future;
use log::warn;
use tokio::{
    signal,
    time::{Instant, timeout_at},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;

use super::{Bound, RelayServer, ServerError};
use crate::session::SessionContext;

impl RelayServer<Bound> {
    /// Run the server until Ctrl+C is received.
    ///
    /// ```compile_fail
    /// use courier::server::RelayServer;
    ///
    /// async fn try_run() {
    ///     RelayServer::new()
    ///         .run()
    ///         .await
    ///         .expect("unbound servers do not expose run()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; the `Result` leaves room for
    /// runtime failures. Accept failures are retried with exponential
    /// back-off and do not surface as errors.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("failed to listen for Ctrl+C: error={e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves, then shut down
    /// in order:
    ///
    /// 1. stop accepting and close the listener,
    /// 2. send the shutdown notice to every registered connection,
    /// 3. wait for sessions to end, until the grace period that began at
    ///    step 2 runs out,
    /// 4. force-close any session still running and wait for it.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::net::{Ipv4Addr, SocketAddr};
    ///
    /// use courier::server::RelayServer;
    /// use tokio::sync::oneshot;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), courier::server::ServerError> {
    /// let server = RelayServer::new().bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(async move {
    ///     server
    ///         .run_with_shutdown(async {
    ///             let _ = rx.await;
    ///         })
    ///         .await
    /// });
    ///
    /// let _ = tx.send(());
    /// handle.await.expect("join server task")?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Currently infallible once bound. Accept failures are retried with
    /// exponential back-off and do not surface as errors.
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let RelayServer {
            settings,
            shutdown_grace,
            backoff,
            registry,
            ready_tx,
            state: Bound { listener },
        } = self;
        let accepting = CancellationToken::new();
        let ctx = SessionContext {
            registry: Arc::clone(&registry),
            settings,
            draining: CancellationToken::new(),
            force_close: CancellationToken::new(),
            tracker: TaskTracker::new(),
        };
        let local_addr = listener.local_addr().ok();

        let acceptor = tokio::spawn(accept_loop(
            listener,
            AcceptLoopOptions {
                shutdown: accepting.clone(),
                backoff,
                session: ctx.clone(),
            },
        ));
        info!(?local_addr, "relay server listening");

        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        shutdown.await;
        info!("shutdown requested");

        // Sessions registering from here on notify themselves.
        ctx.draining.cancel();
        accepting.cancel();
        if let Err(e) = acceptor.await {
            warn!("accept loop ended abnormally: error={e}");
        }

        // One grace period covers both the broadcast and the wind-down.
        let deadline = Instant::now() + shutdown_grace;
        let notified = shutdown::broadcast_shutdown(&registry, deadline).await;
        info!(notified, "shutdown notice sent");

        ctx.tracker.close();
        if timeout_at(deadline, ctx.tracker.wait()).await.is_err() {
            warn!(
                "grace period elapsed, force-closing {} task(s)",
                ctx.tracker.len()
            );
            ctx.force_close.cancel();
            ctx.tracker.wait().await;
        }
        info!("relay server stopped");
        Ok(())
    }
}
