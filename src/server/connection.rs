//! Spawning of per-connection session tasks.

use std::{any::Any, future::Future, net::SocketAddr, panic::AssertUnwindSafe};

use futures::FutureExt;
use log::{error, warn};
use tokio::net::TcpStream;

use crate::{
    metrics,
    session::{SessionContext, serve_connection},
};

/// Spawn a task running the session for `stream`, logging and discarding
/// any panic so one connection cannot take the server down.
pub(super) fn spawn_session_task(stream: TcpStream, ctx: SessionContext) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!("failed to retrieve peer address: error={e}");
            None
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        warn!("failed to disable Nagle: error={e}, peer_addr={peer_addr:?}");
    }
    let tracker = ctx.tracker.clone();
    tracker.spawn(supervise(peer_addr, serve_connection(stream, peer_addr, ctx)));
}

async fn supervise<F>(peer_addr: Option<SocketAddr>, session: F)
where
    F: Future<Output = ()>,
{
    metrics::inc_connections();
    let outcome = AssertUnwindSafe(session).catch_unwind().await;
    metrics::dec_connections();

    if let Err(panic) = outcome {
        metrics::inc_errors();
        let panic_msg = describe_panic(panic.as_ref());
        // Emit via both `log` and `tracing` for tests that capture either.
        error!("session task panicked: panic={panic_msg}, peer_addr={peer_addr:?}");
        tracing::error!(panic = %panic_msg, ?peer_addr, "session task panicked");
    }
}

fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else {
        "<non-string panic payload>".to_owned()
    }
}
