//! Username to connection routing table.
//!
//! `Registry` maps each registered username to a non-owning weak reference
//! to that connection's [`PushHandle`]. The owning session holds the only
//! long-lived strong handle, so an entry whose session has ended can never
//! be routed to even before it is unregistered; such dead entries are
//! pruned lazily at lookup time.
//!
//! The map is a [`DashMap`]: every operation takes the lock of the shard
//! that owns the username, and the lock is released before the caller
//! writes to the returned handle. Pushing a message never holds a registry
//! lock.
//!
//! Registering a username that is already taken replaces the earlier entry
//! (last registration wins). The displaced session keeps running but no
//! longer receives routed messages.

use std::sync::{
    Weak,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::push::{PushHandle, PushHandleInner};

/// Identifier assigned to an accepted connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Allocate a process-unique identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)) }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Concurrent registry of push handles keyed by username.
#[derive(Default)]
pub struct Registry(DashMap<String, Weak<PushHandleInner>>);

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Bind `username` to `handle`, replacing any existing entry.
    ///
    /// Returns the connection that was displaced, if it was still alive.
    pub fn register(&self, username: impl Into<String>, handle: &PushHandle) -> Option<ConnectionId> {
        self.0
            .insert(username.into(), handle.downgrade())
            .and_then(|previous| previous.upgrade())
            .map(|inner| PushHandle::from_arc(inner).connection_id())
    }

    /// Remove the entry for `username` if present.
    pub fn unregister(&self, username: &str) { self.0.remove(username); }

    /// Remove the entry for `username` only if it still belongs to `id`.
    ///
    /// A session calls this on exit so it cannot remove an entry that a
    /// later registration under the same name now owns. Returns whether an
    /// entry was removed.
    pub fn unregister_connection(&self, username: &str, id: ConnectionId) -> bool {
        self.0
            .remove_if(username, |_, weak| {
                weak.upgrade()
                    .is_none_or(|inner| PushHandle::from_arc(inner).connection_id() == id)
            })
            .is_some()
    }

    /// Return the handle currently registered for `username`.
    ///
    /// `None` means the name was never registered, has been unregistered, or
    /// its session has ended.
    pub fn lookup(&self, username: &str) -> Option<PushHandle> {
        let guard = self.0.get(username);
        let handle = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if handle.is_none() {
            self.0.remove_if(username, |_, weak| weak.strong_count() == 0);
        }
        handle.map(PushHandle::from_arc)
    }

    /// Collect every live entry, ordered by username.
    ///
    /// Dead entries are pruned on the way. Each shard is write-locked while
    /// it is visited, so no entry is observed half-updated.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, PushHandle)> {
        let mut entries = Vec::with_capacity(self.0.len());
        self.0.retain(|name, weak| {
            if let Some(inner) = weak.upgrade() {
                entries.push((name.clone(), PushHandle::from_arc(inner)));
                true
            } else {
                false
            }
        });
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Remove all entries whose sessions have ended.
    pub fn prune(&self) { self.0.retain(|_, weak| weak.strong_count() > 0); }

    /// Number of entries, including any not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether the registry holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
