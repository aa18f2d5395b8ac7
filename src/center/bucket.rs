use std::sync::{Arc, Mutex, Weak};

use crate::conn::Connection;

/// Fixed-size routing table mapping a hashed actor identity to a sticky
/// `Connection`.
///
/// Each slot holds `Weak<dyn Connection>` so the table never keeps a
/// connection alive on its own — once every other owner (the
/// `ConnectionManager`'s pool entry, the connection's own reader task) has
/// dropped it, the slot's reference silently goes stale and is repaired on
/// next read. A true lock-free compare-and-set of a `Weak<dyn Trait>` fat
/// pointer has no portable atomic representation in safe Rust, so each
/// slot is guarded by its own short-lived mutex instead — see DESIGN.md.
pub(crate) struct BucketTable {
    slots: Vec<Mutex<Option<Weak<dyn Connection>>>>,
}

impl BucketTable {
    pub fn new(size: usize) -> Self {
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, || Mutex::new(None));
        BucketTable { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Reads the connection at `index`, repairing a stale (expired) weak
    /// reference, or one that upgraded but is no longer valid, by simply
    /// reporting it as empty — the next caller will obtain a fresh
    /// connection and reinstall it.
    pub fn get(&self, index: usize) -> Option<Arc<dyn Connection>> {
        self.slots[index]
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(|conn| conn.is_valid())
    }

    /// Installs `conn` at `index` if the slot still holds nothing live (the
    /// state this caller observed via a prior `get`). If another task won
    /// the race and installed a still-live connection first, that
    /// connection is returned instead of ours. A slot occupant that
    /// upgrades but has since gone invalid is treated the same as an empty
    /// slot and is replaced with `conn`.
    pub fn install(&self, index: usize, conn: Arc<dyn Connection>) -> Arc<dyn Connection> {
        let mut slot = self.slots[index].lock().unwrap();
        if let Some(existing) = slot.as_ref().and_then(Weak::upgrade) {
            if existing.is_valid() {
                return existing;
            }
        }
        *slot = Some(Arc::downgrade(&conn));
        conn
    }
}
