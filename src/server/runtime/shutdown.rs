//! Shutdown broadcast.

use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::registry::Registry;

/// Queue the shutdown notice on every registered connection.
///
/// The notice goes through each connection's own writer, so it never
/// interleaves with a frame already being written. A connection whose
/// outbox stays full past `deadline` is skipped; the force-close that
/// follows the grace period reaches it instead. Returns how many
/// connections accepted the notice, including those that accepted it
/// before the deadline cut the broadcast short.
pub(super) async fn broadcast_shutdown(registry: &Registry, deadline: Instant) -> usize {
    let targets = registry.snapshot();
    let total = targets.len();
    let sent = AtomicUsize::new(0);
    let sent_ref = &sent;
    let sends = targets.iter().map(|(username, handle)| async move {
        match handle.notify_shutdown().await {
            Ok(queued) => {
                sent_ref.fetch_add(1, Ordering::Relaxed);
                debug!(%username, connection_id = %handle.connection_id(), queued, "shutdown notice");
            }
            Err(e) => debug!(%username, error = %e, "connection closed before shutdown notice"),
        }
    });

    let finished = timeout_at(deadline, join_all(sends)).await.is_ok();
    let sent = sent.load(Ordering::Relaxed);
    if !finished {
        warn!(total, sent, "shutdown notice not delivered to every connection in time");
    }
    sent
}
