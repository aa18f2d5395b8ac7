use std::cell::Cell;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::conn::Connection;

thread_local! {
    /// Per-thread round-robin cursor (dead weight at
    /// `MaxConnectionsPerEndpoint = 1`, but free to keep for when that
    /// grows past 1). Shared across endpoints — fairness here is explicitly
    /// best-effort, never index-out-of-bounds.
    static NEXT_CONNECTION: Cell<usize> = Cell::new(0);
}

fn next_cursor() -> usize {
    NEXT_CONNECTION.with(|c| {
        let v = c.get();
        c.set(v.wrapping_add(1));
        v
    })
}

pub(super) enum Pick {
    /// The entry was at capacity and the round-robin pick is a live
    /// connection.
    Hit(Arc<dyn Connection>),
    /// The entry has room for another connection, or the picked connection
    /// was no longer valid — either way, the caller should take the slow
    /// path.
    Miss,
}

/// One endpoint's worth of pooled connections plus the bookkeeping that
/// serializes dialing it.
pub(super) struct ConnectionEntry {
    connections: Mutex<Vec<Arc<dyn Connection>>>,
    pub(super) attempt_guard: Semaphore,
    pub(super) last_failure: Mutex<Option<Instant>>,
}

impl ConnectionEntry {
    pub(super) fn empty() -> Self {
        ConnectionEntry {
            connections: Mutex::new(Vec::new()),
            attempt_guard: Semaphore::new(1),
            last_failure: Mutex::new(None),
        }
    }

    /// Prunes any connection that has gone invalid since it was pooled
    /// before picking, so a dead entry never holds `max` slots hostage —
    /// a stale connection is detected and repaired on read, the same way
    /// the bucket table handles it.
    pub(super) fn try_pick(&self, max: usize) -> Pick {
        let mut conns = self.connections.lock().unwrap();
        conns.retain(|c| c.is_valid());
        if conns.is_empty() || conns.len() < max {
            return Pick::Miss;
        }
        let idx = next_cursor() % conns.len();
        Pick::Hit(conns[idx].clone())
    }

    pub(super) fn push(&self, conn: Arc<dyn Connection>) {
        self.connections.lock().unwrap().push(conn);
    }

    /// Removes `conn` from this entry. Returns `true` if the entry is now
    /// empty (the caller should drop it from the map). A connection absent
    /// from the list (already removed by a prior call) is a no-op.
    pub(super) fn remove(&self, conn: &Arc<dyn Connection>) -> bool {
        let mut conns = self.connections.lock().unwrap();
        conns.retain(|c| !Arc::ptr_eq(c, conn));
        conns.is_empty()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.connections.lock().unwrap().is_empty()
    }

    pub(super) fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub(super) fn snapshot(&self) -> Vec<Arc<dyn Connection>> {
        self.connections.lock().unwrap().clone()
    }
}
