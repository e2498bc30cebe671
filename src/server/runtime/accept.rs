//! Accept loop for the relay server.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::warn;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Duration, sleep},
};
use tokio_util::sync::CancellationToken;

use super::backoff::BackoffConfig;
use crate::{server::connection::spawn_session_task, session::SessionContext};

/// Abstraction for sources of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

pub(in crate::server) struct AcceptLoopOptions {
    /// Cancelled to stop accepting.
    pub shutdown: CancellationToken,
    pub backoff: BackoffConfig,
    /// Handed to every session spawned by the loop.
    pub session: SessionContext,
}

/// Accept connections until `shutdown` is cancelled, spawning a session
/// task for each.
///
/// Accept failures are logged and retried after an exponentially growing
/// delay that resets on the next success. The back-off sleep is itself
/// cancellable. The listener is dropped when the loop returns, so new
/// connection attempts are refused from then on.
pub(in crate::server) async fn accept_loop<L>(listener: Arc<L>, options: AcceptLoopOptions)
where
    L: AcceptListener + 'static,
{
    let AcceptLoopOptions {
        shutdown,
        backoff,
        session,
    } = options;
    let backoff = backoff.normalized();
    let mut delay = backoff.initial_delay;
    while let Some(next) = accept_iteration(listener.as_ref(), &shutdown, &session, delay).await {
        delay = match next {
            Accepted::Yes => backoff.initial_delay,
            Accepted::No => {
                let cancelled = select! {
                    biased;

                    () = shutdown.cancelled() => true,
                    () = sleep(delay) => false,
                };
                if cancelled {
                    break;
                }
                backoff.next_delay(delay)
            }
        };
    }
}

enum Accepted {
    Yes,
    No,
}

async fn accept_iteration<L>(
    listener: &L,
    shutdown: &CancellationToken,
    session: &SessionContext,
    delay: Duration,
) -> Option<Accepted>
where
    L: AcceptListener,
{
    select! {
        biased;

        () = shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, _)) => {
                spawn_session_task(stream, session.clone());
                Accepted::Yes
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}, retry_in={delay:?}");
                Accepted::No
            }
        }),
    }
}
