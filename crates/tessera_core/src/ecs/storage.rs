//! # Chunked Component Storage
//!
//! Append-only list of chunks for a single component type.
//!
//! The store only grows when a value is written past its last chunk, so
//! memory follows the highest id that ever held this component instead of
//! the whole id space.
//!
//! ## Locking
//!
//! - The chunk list sits behind a `RwLock` that is write-locked only to
//!   append chunks.
//! - Each chunk sits behind its own `Mutex`.
//!
//! A chunk is never removed, reordered or resized once appended, so a
//! reader can [`snapshot`](ChunkedStore::snapshot) the list, drop the list
//! lock, and iterate the chunks it saw while other threads keep appending.
//! No chunk lock is held while caller code runs.

use std::any::Any;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::chunk::Chunk;
use super::component::{BoxedComponent, Component};
use super::entity::{ChunkAddress, Entity};

/// Shared handle to one chunk.
pub type SharedChunk<T> = Arc<Mutex<Chunk<T>>>;

/// Storage for one component type.
///
/// # Example
///
/// ```rust,ignore
/// let store: ChunkedStore<Position> = ChunkedStore::new(4);
/// store.set_at(2, 3, Position::new(1.0, 2.0, 3.0), true);
/// assert_eq!(store.chunk_count(), 3);
/// ```
pub struct ChunkedStore<T: Component> {
    chunk_bit_width: u32,
    chunks: RwLock<Vec<SharedChunk<T>>>,
}

impl<T: Component> ChunkedStore<T> {
    /// Creates an empty store. No chunk is allocated until first write.
    #[must_use]
    pub fn new(chunk_bit_width: u32) -> Self {
        Self {
            chunk_bit_width,
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Bit width used to address rows.
    #[inline]
    #[must_use]
    pub fn chunk_bit_width(&self) -> u32 {
        self.chunk_bit_width
    }

    /// Number of chunks allocated so far.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// Total number of present values across all chunks.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.snapshot().iter().map(|chunk| chunk.lock().live()).sum()
    }

    /// Writes a value and its existence flag.
    ///
    /// Writing a present value past the last chunk appends chunks up to and
    /// including `chunk_index`. Clearing a slot in a chunk that does not
    /// exist yet does nothing.
    pub fn set_at(&self, chunk_index: usize, row: usize, value: T, exists: bool) {
        if let Some(chunk) = self.chunk(chunk_index) {
            chunk.lock().set(row, value, exists);
            return;
        }
        if !exists {
            return;
        }

        // Another writer may have appended between the two acquisitions.
        let mut chunks = self.chunks.write();
        let before = chunks.len();
        while chunks.len() <= chunk_index {
            chunks.push(Arc::new(Mutex::new(Chunk::new(self.chunk_bit_width))));
        }
        tracing::debug!(
            component = T::type_name(),
            from = before,
            to = chunks.len(),
            "component store grew"
        );
        chunks[chunk_index].lock().set(row, value, exists);
    }

    /// Reads a value if its chunk exists and its flag is set.
    #[must_use]
    pub fn try_get_at(&self, chunk_index: usize, row: usize) -> Option<T> {
        let chunk = self.chunk(chunk_index)?;
        let chunk = chunk.lock();
        chunk.get(row)
    }

    /// Writes the value for an entity.
    #[inline]
    pub fn set(&self, entity: Entity, value: T) {
        if let Some(addr) = ChunkAddress::of(entity, self.chunk_bit_width) {
            self.set_at(addr.chunk, addr.row, value, true);
        }
    }

    /// Clears the value for an entity.
    #[inline]
    pub fn clear(&self, entity: Entity) {
        if let Some(addr) = ChunkAddress::of(entity, self.chunk_bit_width) {
            self.set_at(addr.chunk, addr.row, T::default(), false);
        }
    }

    /// Clears the value for an entity and returns what was there.
    ///
    /// The read and the clear happen under one chunk lock, so of two racing
    /// callers only one sees `Some`.
    pub fn take(&self, entity: Entity) -> Option<T> {
        let addr = ChunkAddress::of(entity, self.chunk_bit_width)?;
        let chunk = self.chunk(addr.chunk)?;
        let mut chunk = chunk.lock();
        let previous = chunk.get(addr.row);
        if previous.is_some() {
            chunk.set(addr.row, T::default(), false);
        }
        previous
    }

    /// Reads the value for an entity.
    #[inline]
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<T> {
        let addr = ChunkAddress::of(entity, self.chunk_bit_width)?;
        self.try_get_at(addr.chunk, addr.row)
    }

    /// Handle to chunk `index`, if it has been allocated.
    #[inline]
    #[must_use]
    pub fn chunk(&self, index: usize) -> Option<SharedChunk<T>> {
        self.chunks.read().get(index).cloned()
    }

    /// Clones the current chunk list and releases the list lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SharedChunk<T>> {
        self.chunks.read().clone()
    }

    /// Returns the first entity, in id order, for which `predicate` holds.
    ///
    /// Each chunk's present rows are copied out before `predicate` runs, so
    /// the predicate may call back into the store.
    pub fn find<F>(&self, mut predicate: F) -> Option<Entity>
    where
        F: FnMut(Entity, &T) -> bool,
    {
        let mut rows = Vec::new();
        for (chunk_index, chunk) in self.snapshot().iter().enumerate() {
            rows.clear();
            {
                let chunk = chunk.lock();
                if chunk.live() == 0 {
                    continue;
                }
                rows.extend(
                    chunk
                        .values()
                        .iter()
                        .zip(chunk.exists())
                        .enumerate()
                        .filter(|(_, (_, &exists))| exists)
                        .map(|(row, (&value, _))| (row, value)),
                );
            }
            for (row, value) in &rows {
                let entity = ChunkAddress {
                    chunk: chunk_index,
                    row: *row,
                }
                .entity(self.chunk_bit_width);
                if predicate(entity, value) {
                    return Some(entity);
                }
            }
        }
        None
    }
}

mod sealed {
    /// Keeps [`ErasedStore`](super::ErasedStore) closed to outside impls.
    pub trait Sealed {}
    impl<T: super::Component> Sealed for super::ChunkedStore<T> {}
}

/// Type-erased view of a [`ChunkedStore`], used to keep stores of different
/// component types in one map.
///
/// Sealed: the only implementor is `ChunkedStore<T>`, which lets the data
/// store downcast once per lookup and keep the iteration loop monomorphic.
pub trait ErasedStore: sealed::Sealed + Send + Sync {
    /// Name of the stored component type.
    fn component_name(&self) -> &'static str;

    /// Number of allocated chunks.
    fn chunk_count(&self) -> usize;

    /// Clears the entity's flag (and zeroes its slot).
    fn clear_entity(&self, entity: Entity);

    /// Copies the entity's value out, boxed.
    fn boxed(&self, entity: Entity) -> Option<BoxedComponent>;

    /// Upcasts for downcasting back to the concrete store.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Component> ErasedStore for ChunkedStore<T> {
    fn component_name(&self) -> &'static str {
        T::type_name()
    }

    fn chunk_count(&self) -> usize {
        ChunkedStore::chunk_count(self)
    }

    fn clear_entity(&self, entity: Entity) {
        self.clear(entity);
    }

    fn boxed(&self, entity: Entity) -> Option<BoxedComponent> {
        self.get(entity).map(BoxedComponent::new)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
