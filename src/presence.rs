//! Presence registry: the single owner of "who is online right now".
//!
//! Maps identities to live connection handles. All access goes through the
//! operations here; no other component touches the map. DashMap shard locks
//! serialize mutations, and lookups clone the handle out so no lock is ever
//! held across an await point.

use crate::identity::Identity;
use crate::protocol::ServerEvent;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Process-local identifier for one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Allocates connection ids, one per accepted transport connection.
#[derive(Default)]
pub struct ConnIdGenerator {
    next: AtomicU64,
}

impl ConnIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> ConnId {
        ConnId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// A live route to one connection's outgoing queue.
///
/// Owned by the transport task; the registry only ever holds clones. Once the
/// task exits, the channel closes and forwards start failing, which is how
/// stale entries surface until cleanup removes them.
#[derive(Clone)]
pub struct ConnectionHandle {
    conn_id: ConnId,
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(conn_id: ConnId, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { conn_id, tx }
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    /// Best-effort forward. Returns false when the handle has gone stale
    /// (connection task exited) or its queue is full; the event is dropped.
    pub fn forward(&self, event: ServerEvent) -> bool {
        self.tx.try_send(event).is_ok()
    }
}

/// Identity → connection handle mapping for currently-connected participants.
#[derive(Default)]
pub struct PresenceRegistry {
    entries: DashMap<Identity, ConnectionHandle>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or overwrite the entry for `identity`. The most recent join
    /// wins; any prior entry is replaced even if its connection is still open.
    pub fn register(&self, identity: Identity, handle: ConnectionHandle) {
        self.entries.insert(identity, handle);
    }

    /// Snapshot-consistent read; the returned handle is a clone.
    pub fn lookup(&self, identity: &Identity) -> Option<ConnectionHandle> {
        self.entries.get(identity).map(|e| e.value().clone())
    }

    /// Remove every entry bound to `conn_id`. Normally that is zero or one
    /// entry, but a connection that re-joined under several identities leaves
    /// several; all of them die with the connection. Returns the removal count.
    pub fn remove_by_handle(&self, conn_id: ConnId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, handle| handle.conn_id() != conn_id);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
