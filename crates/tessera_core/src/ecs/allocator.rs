//! # Entity Id Allocation
//!
//! Ids come from a monotonic atomic counter. Freed ids go through an
//! unbounded MPMC channel and are handed out again before the counter moves.
//! Neither side takes a lock, so allocation never contends with the store's
//! structural locks.

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::entity::Entity;

/// Issues and recycles entity ids.
pub struct EntityAllocator {
    last_id: AtomicU32,
    freed_tx: Sender<Entity>,
    freed_rx: Receiver<Entity>,
}

impl EntityAllocator {
    /// Creates an allocator whose first id is `1`.
    #[must_use]
    pub fn new() -> Self {
        let (freed_tx, freed_rx) = unbounded();
        Self {
            last_id: AtomicU32::new(0),
            freed_tx,
            freed_rx,
        }
    }

    /// Creates an allocator whose first fresh id is `last_id + 1`.
    #[must_use]
    pub fn starting_after(last_id: u32) -> Self {
        let allocator = Self::new();
        allocator.last_id.store(last_id, Ordering::Relaxed);
        allocator
    }

    /// Returns a recycled id, or `last_id + 1` if none is waiting.
    ///
    /// Returns `None` when no id is waiting and `u32::MAX` has been issued.
    /// The counter never wraps, so the null id is never handed out.
    #[inline]
    pub fn allocate(&self) -> Option<Entity> {
        if let Ok(entity) = self.freed_rx.try_recv() {
            return Some(entity);
        }
        self.last_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(1))
            .ok()
            .map(|previous| Entity::from_raw(previous + 1))
    }

    /// Queues an id for reuse.
    ///
    /// The caller must have cleared the entity from every store first.
    #[inline]
    pub fn free(&self, entity: Entity) {
        if entity.is_null() {
            return;
        }
        // Both channel ends live in `self`, so the send cannot fail.
        let _ = self.freed_tx.send(entity);
    }

    /// Highest id handed out so far.
    #[inline]
    #[must_use]
    pub fn last_id(&self) -> u32 {
        self.last_id.load(Ordering::Relaxed)
    }

    /// Number of ids waiting to be reused.
    #[inline]
    #[must_use]
    pub fn recycled_count(&self) -> usize {
        self.freed_rx.len()
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
