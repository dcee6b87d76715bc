//! # Data Store
//!
//! Owns one [`ChunkedStore`] per component type, the entity allocator, and
//! every create/add/remove/query operation.
//!
//! ## Layout
//!
//! ```text
//! TypeId(Position) -> [chunk 0][chunk 1][chunk 2]
//! TypeId(Velocity) -> [chunk 0][chunk 1]
//! TypeId(Health)   -> [chunk 0]
//! ```
//!
//! Chunk `i` covers the same entity ids in every store, so a two-type query
//! walks both lists in lockstep up to the shorter one.
//!
//! ## Locking
//!
//! 1. The type map is read-locked for lookups and write-locked only when a
//!    new component type appears. It is released before any store is touched.
//! 2. Each store's chunk list is write-locked only to append chunks.
//! 3. Each chunk has its own mutex, held while a row is written or copied.
//!
//! Queries never hold a chunk lock while a callback runs. Per chunk they
//! lock it (a two-type query locks its pair in `TypeId` order, then the
//! matching liveness chunk), copy the live rows out, and unlock. Callbacks
//! then run on the copies. Afterwards the chunk is locked again and each
//! changed row is written back if its flag is still set. A callback can
//! therefore read, write, create or delete anything, the row it is visiting
//! included:
//!
//! - a row deleted or removed during the walk is not written back;
//! - a write made through the store to a row the callback leaves unchanged
//!   survives; if the callback changes that row too, the callback's value wins;
//! - two queries writing the same rows at once each write back their own
//!   changes, and the last write-back wins.
//!
//! ## Visibility
//!
//! An entity becomes alive only after [`DataStore::create`] has seeded its
//! components, and stops being alive before [`DataStore::delete`] clears
//! them. Queries, [`DataStore::find`] and [`DataStore::get`] only report live
//! entities, so a concurrent reader sees either none or all of the
//! components a `create2` seeded. Point reads through
//! [`DataStore::get_component`] see each component as soon as it is written.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use parking_lot::{Mutex, MutexGuard, RwLock};
use rayon::prelude::*;

use super::allocator::EntityAllocator;
use super::chunk::Chunk;
use super::component::{BoxedComponent, Component};
use super::entity::{ChunkAddress, Entity};
use super::storage::{ChunkedStore, ErasedStore};
use crate::config::StoreConfig;
use crate::error::StoreResult;

/// Liveness marker kept outside the type map, so it never shows up as a
/// component of the entity.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(transparent)]
struct Alive(u8);

impl Component for Alive {}

/// The central container for all entities and components.
///
/// Every operation takes `&self` and synchronizes internally, so a store can
/// be shared by all systems of a tick.
///
/// # Example
///
/// ```rust,ignore
/// let store = DataStore::with_chunk_bit_width(16)?;
/// let e = store.create(Position::new(0.0, 0.0, 0.0));
/// store.add_or_update(e, Velocity::new(1.0, 0.0, 0.0));
///
/// store.query2::<Position, Velocity, _>(1.0, |dt, _, _, p, v| p.integrate(*v, dt));
/// assert_eq!(store.get_component::<Position>(e), Some(Position::new(1.0, 0.0, 0.0)));
/// ```
pub struct DataStore {
    config: StoreConfig,
    stores: RwLock<HashMap<TypeId, Arc<dyn ErasedStore>>>,
    alive: ChunkedStore<Alive>,
    allocator: EntityAllocator,
}

impl DataStore {
    /// Creates an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ChunkBitWidthTooLarge`](crate::StoreError) when
    /// the chunk bit width is above the supported bound.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stores: RwLock::new(HashMap::new()),
            alive: ChunkedStore::new(config.chunk_bit_width),
            allocator: EntityAllocator::new(),
        })
    }

    /// Creates an empty store with default settings and the given chunk
    /// bit width.
    ///
    /// # Errors
    ///
    /// Same as [`DataStore::new`].
    pub fn with_chunk_bit_width(chunk_bit_width: u32) -> StoreResult<Self> {
        Self::new(StoreConfig::with_chunk_bit_width(chunk_bit_width))
    }

    /// Settings this store was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // =========================================================================
    // Store lookup
    // =========================================================================

    fn store<T: Component>(&self) -> Option<Arc<ChunkedStore<T>>> {
        let erased = self.stores.read().get(&TypeId::of::<T>()).cloned()?;
        erased.into_any().downcast::<ChunkedStore<T>>().ok()
    }

    fn store_or_insert<T: Component>(&self) -> Arc<ChunkedStore<T>> {
        if let Some(store) = self.store::<T>() {
            return store;
        }

        let typed = Arc::new(ChunkedStore::<T>::new(self.config.chunk_bit_width));
        let mut stores = self.stores.write();
        if let Some(existing) = stores.get(&TypeId::of::<T>()).cloned() {
            // Lost the race against another registration of `T`.
            drop(stores);
            return existing
                .into_any()
                .downcast::<ChunkedStore<T>>()
                .unwrap_or(typed);
        }
        stores.insert(TypeId::of::<T>(), Arc::clone(&typed) as Arc<dyn ErasedStore>);
        drop(stores);

        tracing::debug!(component = T::type_name(), "component store created");
        typed
    }

    fn all_stores(&self) -> Vec<Arc<dyn ErasedStore>> {
        self.stores.read().values().cloned().collect()
    }

    /// Creates the store for `T` up front.
    ///
    /// Optional: stores are also created on first write.
    pub fn register<T: Component>(&self) {
        self.store_or_insert::<T>();
    }

    /// Number of component types with a backing store.
    #[must_use]
    pub fn component_type_count(&self) -> usize {
        self.stores.read().len()
    }

    /// Names of all component types with a backing store, sorted.
    #[must_use]
    pub fn component_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .all_stores()
            .iter()
            .map(|store| store.component_name())
            .collect();
        names.sort_unstable();
        names
    }

    /// Number of chunks allocated for `T`, zero if `T` was never stored.
    #[must_use]
    pub fn chunk_count<T: Component>(&self) -> usize {
        self.store::<T>().map_or(0, |store| store.chunk_count())
    }

    // =========================================================================
    // Entity lifecycle
    // =========================================================================

    /// Takes an id without making it alive yet.
    fn reserve(&self) -> Entity {
        self.allocator.allocate().unwrap_or_else(|| {
            tracing::error!(last_id = self.allocator.last_id(), "entity id space exhausted");
            Entity::NULL
        })
    }

    /// Allocates an entity with no components.
    ///
    /// Reuses a deleted id when one is waiting, otherwise issues
    /// `last_id + 1`. Returns [`Entity::NULL`] once every id up to
    /// `u32::MAX` is in use; every operation ignores the null entity.
    pub fn new_entity(&self) -> Entity {
        let entity = self.reserve();
        self.alive.set(entity, Alive(1));
        entity
    }

    /// Checks if an entity was created and not deleted since.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.alive.get(entity).is_some()
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.alive.live_count()
    }

    /// Highest id issued so far.
    #[must_use]
    pub fn last_id(&self) -> u32 {
        self.allocator.last_id()
    }

    /// Creates an entity carrying `component`.
    ///
    /// The component is written before the entity turns alive.
    pub fn create<T: Component>(&self, component: T) -> Entity {
        let entity = self.reserve();
        self.add_or_update(entity, component);
        self.alive.set(entity, Alive(1));
        entity
    }

    /// Creates an entity carrying two components.
    ///
    /// Both components are written before the entity turns alive.
    pub fn create2<T1: Component, T2: Component>(&self, first: T1, second: T2) -> Entity {
        let entity = self.reserve();
        self.add_or_update2(entity, first, second);
        self.alive.set(entity, Alive(1));
        entity
    }

    /// Clears the entity from every component store and recycles its id.
    ///
    /// Returns `false` if the entity was not alive; its rows are still
    /// cleared but the id is not queued again.
    pub fn delete(&self, entity: Entity) -> bool {
        if entity.is_null() {
            return false;
        }
        let was_alive = self.alive.take(entity).is_some();
        for store in self.all_stores() {
            store.clear_entity(entity);
        }
        if !was_alive {
            tracing::warn!(%entity, "delete of an entity that is not alive");
            return false;
        }
        self.allocator.free(entity);
        true
    }

    // =========================================================================
    // Component mutation
    // =========================================================================

    /// Attaches `component` to the entity, replacing any previous value.
    pub fn add_or_update<T: Component>(&self, entity: Entity, component: T) {
        self.store_or_insert::<T>().set(entity, component);
    }

    /// Attaches two components to the entity.
    pub fn add_or_update2<T1: Component, T2: Component>(
        &self,
        entity: Entity,
        first: T1,
        second: T2,
    ) {
        self.add_or_update(entity, first);
        self.add_or_update(entity, second);
    }

    /// Detaches `T` from the entity.
    ///
    /// Returns `false` only when `T` has no backing store. Removing a
    /// component the entity does not have is not an error.
    pub fn remove<T: Component>(&self, entity: Entity) -> bool {
        match self.store::<T>() {
            Some(store) => {
                store.clear(entity);
                true
            }
            None => false,
        }
    }

    /// Detaches `T1` and `T2` from the entity.
    ///
    /// Both removals are attempted; returns `false` if either type has no
    /// backing store.
    pub fn remove2<T1: Component, T2: Component>(&self, entity: Entity) -> bool {
        let first = self.remove::<T1>(entity);
        let second = self.remove::<T2>(entity);
        first && second
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Reads the entity's `T`, if present.
    #[must_use]
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<T> {
        self.store::<T>()?.get(entity)
    }

    /// Checks if the entity has a `T`.
    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.get_component::<T>(entity).is_some()
    }

    /// Returns the first live entity, in id order, whose `T` satisfies
    /// `predicate`.
    ///
    /// Linear scan over every chunk of `T`. Meant for rare searches, not for
    /// per-tick logic.
    pub fn find<T, F>(&self, mut predicate: F) -> Option<Entity>
    where
        T: Component,
        F: FnMut(&T) -> bool,
    {
        self.store::<T>()?
            .find(|entity, value| self.is_alive(entity) && predicate(value))
    }

    /// Copies out every component present on a live entity.
    ///
    /// Pays one lookup per registered component type and one allocation per
    /// value; intended for inspectors and debugging. Sorted by type name.
    /// Empty for an entity that is not alive.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Vec<BoxedComponent> {
        if !self.is_alive(entity) {
            return Vec::new();
        }
        let mut components: Vec<_> = self
            .all_stores()
            .iter()
            .filter_map(|store| store.boxed(entity))
            .collect();
        components.sort_by_key(BoxedComponent::type_name);
        components
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Calls `callback` for every live entity that has a `T`.
    ///
    /// Mutations made through the `&mut T` are written back once the chunk
    /// has been visited. Chunks with more matching rows than the parallel
    /// threshold are visited with a parallel loop, in unspecified row order;
    /// smaller ones in id order.
    pub fn query<T, F>(&self, delta: f32, callback: F)
    where
        T: Component,
        F: Fn(f32, &DataStore, Entity, &mut T) + Sync,
    {
        let Some(store) = self.store::<T>() else {
            return;
        };
        let width = self.config.chunk_bit_width;
        let mut rows: Vec<Staged<T>> = Vec::new();

        for (chunk_index, chunk) in store.snapshot().iter().enumerate() {
            let Some(alive) = self.alive.chunk(chunk_index) else {
                continue;
            };
            rows.clear();
            {
                let chunk = chunk.lock();
                if chunk.live() == 0 {
                    continue;
                }
                let alive = alive.lock();
                rows.extend(live_rows(&chunk, &alive).map(|row| Staged::new(row, chunk.values()[row])));
            }
            if rows.is_empty() {
                continue;
            }

            let visit = |staged: &mut Staged<T>| {
                let entity = ChunkAddress {
                    chunk: chunk_index,
                    row: staged.row,
                }
                .entity(width);
                callback(delta, self, entity, &mut staged.value);
            };
            if rows.len() > self.config.parallel_threshold {
                rows.par_iter_mut().for_each(&visit);
            } else {
                rows.iter_mut().for_each(&visit);
            }

            let mut chunk = chunk.lock();
            for staged in rows.iter().filter(|staged| staged.changed()) {
                chunk.update(staged.row, staged.value);
            }
        }
    }

    /// Calls `callback` for every live entity that has both a `T1` and a `T2`.
    ///
    /// Walks the first `min(chunks(T1), chunks(T2))` chunks; no entity past
    /// that range can have both. The parallel/sequential choice is made per
    /// chunk pair from the number of matching rows. `T1 == T2` is rejected
    /// with a warning and visits nothing.
    pub fn query2<T1, T2, F>(&self, delta: f32, callback: F)
    where
        T1: Component,
        T2: Component,
        F: Fn(f32, &DataStore, Entity, &mut T1, &mut T2) + Sync,
    {
        if TypeId::of::<T1>() == TypeId::of::<T2>() {
            tracing::warn!(
                component = T1::type_name(),
                "two-type query over a single component type"
            );
            return;
        }
        let (Some(first), Some(second)) = (self.store::<T1>(), self.store::<T2>()) else {
            return;
        };
        let width = self.config.chunk_bit_width;
        let first_chunks = first.snapshot();
        let second_chunks = second.snapshot();
        let mut rows: Vec<(Staged<T1>, Staged<T2>)> = Vec::new();

        for (chunk_index, (a, b)) in first_chunks.iter().zip(&second_chunks).enumerate() {
            let Some(alive) = self.alive.chunk(chunk_index) else {
                continue;
            };
            rows.clear();
            {
                let (a, b) = lock_pair::<T1, T2>(a, b);
                if a.live() == 0 || b.live() == 0 {
                    continue;
                }
                let alive = alive.lock();
                rows.extend(
                    live_rows(&a, &alive)
                        .filter(|&row| b.contains(row))
                        .map(|row| (Staged::new(row, a.values()[row]), Staged::new(row, b.values()[row]))),
                );
            }
            if rows.is_empty() {
                continue;
            }

            let visit = |(x, y): &mut (Staged<T1>, Staged<T2>)| {
                let entity = ChunkAddress {
                    chunk: chunk_index,
                    row: x.row,
                }
                .entity(width);
                callback(delta, self, entity, &mut x.value, &mut y.value);
            };
            if rows.len() > self.config.parallel_threshold {
                rows.par_iter_mut().for_each(&visit);
            } else {
                rows.iter_mut().for_each(&visit);
            }

            let (mut a, mut b) = lock_pair::<T1, T2>(a, b);
            for (x, y) in &rows {
                if x.changed() {
                    a.update(x.row, x.value);
                }
                if y.changed() {
                    b.update(y.row, y.value);
                }
            }
        }
    }
}

/// A row copied out of its chunk while callbacks run on it.
struct Staged<T> {
    row: usize,
    before: T,
    value: T,
}

impl<T: Component> Staged<T> {
    fn new(row: usize, value: T) -> Self {
        Self {
            row,
            before: value,
            value,
        }
    }

    /// Whether the callback changed the value's bytes.
    fn changed(&self) -> bool {
        bytemuck::bytes_of(&self.before) != bytemuck::bytes_of(&self.value)
    }
}

/// Rows whose component flag is set and whose entity is alive.
fn live_rows<'a, T: Component>(
    chunk: &'a Chunk<T>,
    alive: &'a Chunk<Alive>,
) -> impl Iterator<Item = usize> + 'a {
    chunk
        .exists()
        .iter()
        .zip(alive.exists())
        .enumerate()
        .filter_map(|(row, (&present, &live))| (present && live).then_some(row))
}

/// Locks two chunks of different component types in `TypeId` order.
fn lock_pair<'a, T1: Component, T2: Component>(
    a: &'a Mutex<Chunk<T1>>,
    b: &'a Mutex<Chunk<T2>>,
) -> (MutexGuard<'a, Chunk<T1>>, MutexGuard<'a, Chunk<T2>>) {
    if TypeId::of::<T1>() < TypeId::of::<T2>() {
        let a = a.lock();
        (a, b.lock())
    } else {
        let b = b.lock();
        (a.lock(), b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::{Position, Velocity};
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Health {
        current: f32,
        max: f32,
    }

    impl Component for Health {}

    fn store(width: u32) -> DataStore {
        DataStore::with_chunk_bit_width(width).unwrap()
    }

    #[test]
    fn test_rejects_wide_chunks() {
        assert!(matches!(
            DataStore::with_chunk_bit_width(31),
            Err(StoreError::ChunkBitWidthTooLarge { requested: 31, .. })
        ));
        assert!(DataStore::with_chunk_bit_width(30).is_ok());
    }

    #[test]
    fn test_round_trip() {
        let store = store(4);
        let e = store.new_entity();
        store.add_or_update(e, Health { current: 3.0, max: 10.0 });
        assert_eq!(store.get_component::<Health>(e), Some(Health { current: 3.0, max: 10.0 }));

        store.add_or_update(e, Health { current: 7.0, max: 10.0 });
        assert_eq!(store.get_component::<Health>(e), Some(Health { current: 7.0, max: 10.0 }));
    }

    #[test]
    fn test_unregistered_type_is_absent() {
        let store = store(4);
        let e = store.create(Position::new(1.0, 0.0, 0.0));
        assert!(!store.remove::<Velocity>(e));
        assert!(!store.remove::<Velocity>(e));
        assert_eq!(store.get_component::<Velocity>(e), None);
        assert_eq!(store.find::<Velocity, _>(|_| true), None);
        assert_eq!(store.chunk_count::<Velocity>(), 0);

        let calls = AtomicUsize::new(0);
        store.query::<Velocity, _>(1.0, |_, _, _, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        });
        store.query2::<Position, Velocity, _>(1.0, |_, _, _, _, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_remove_registered_type() {
        let store = store(4);
        let a = store.create(Position::new(1.0, 0.0, 0.0));
        let b = store.new_entity();
        assert!(store.remove::<Position>(b));
        assert!(store.remove::<Position>(a));
        assert!(!store.has::<Position>(a));
        assert!(store.remove::<Position>(a));
    }

    #[test]
    fn test_remove2_reports_missing_store() {
        let store = store(4);
        let e = store.create2(Position::default(), Velocity::default());
        assert!(!store.remove2::<Position, Health>(e));
        assert!(!store.has::<Position>(e));
        assert!(store.has::<Velocity>(e));
        assert!(store.remove2::<Position, Velocity>(e));
        assert!(!store.has::<Velocity>(e));
    }

    #[test]
    fn test_ids_start_at_one_and_recycle() {
        let store = store(4);
        let a = store.create(Position::default());
        let b = store.create(Position::default());
        assert_eq!(a, Entity::from_raw(1));
        assert_eq!(b, Entity::from_raw(2));

        assert!(store.delete(a));
        assert!(!store.delete(a));
        assert!(!store.is_alive(a));
        assert_eq!(store.create(Velocity::default()), a);
        assert_eq!(store.create(Velocity::default()), Entity::from_raw(3));
        assert_eq!(store.entity_count(), 3);
        assert_eq!(store.last_id(), 3);
    }

    #[test]
    fn test_delete_null_is_noop() {
        let store = store(4);
        assert!(!store.delete(Entity::NULL));
        assert_eq!(store.create(Position::default()), Entity::from_raw(1));
    }

    #[test]
    fn test_recycled_entity_has_no_stale_components() {
        let store = store(4);
        let e = store.create2(Position::new(1.0, 1.0, 1.0), Health { current: 1.0, max: 1.0 });
        store.delete(e);

        let again = store.create(Position::new(5.0, 5.0, 5.0));
        assert_eq!(again, e);
        let components = store.get(again);
        assert_eq!(components.len(), 1);
        assert_eq!(
            components[0].downcast_ref::<Position>(),
            Some(&Position::new(5.0, 5.0, 5.0))
        );
        assert!(!store.has::<Health>(again));
    }

    #[test]
    fn test_deleted_slot_is_zeroed() {
        let store = store(4);
        let e = store.create(Health { current: 9.0, max: 9.0 });
        store.delete(e);

        let chunks = store.store::<Health>().unwrap().snapshot();
        let chunk = chunks[0].lock();
        assert_eq!(chunk.values()[0], Health::zeroed());
        assert_eq!(chunk.live(), 0);
    }

    #[test]
    fn test_get_lists_components_sorted() {
        let store = store(4);
        let e = store.create2(Velocity::new(1.0, 0.0, 0.0), Position::new(2.0, 0.0, 0.0));
        store.register::<Health>();

        let components = store.get(e);
        assert_eq!(components.len(), 2);
        assert!(components[0].is::<Position>());
        assert!(components[1].is::<Velocity>());
        assert_eq!(store.component_type_count(), 3);
        assert_eq!(store.component_names().len(), 3);
        assert!(store.get(Entity::NULL).is_empty());
    }

    #[test]
    fn test_find() {
        let store = store(2);
        for i in 0..10 {
            store.create(Health { current: i as f32, max: 10.0 });
        }
        assert_eq!(
            store.find::<Health, _>(|h| h.current >= 5.0),
            Some(Entity::from_raw(6))
        );
        assert_eq!(store.find::<Health, _>(|h| h.current > 50.0), None);
    }

    #[test]
    fn test_query_mutates_in_place() {
        let store = store(4);
        let entities: Vec<_> = (0..40)
            .map(|i| store.create(Health { current: i as f32, max: 100.0 }))
            .collect();
        store.remove::<Health>(entities[3]);

        let calls = AtomicUsize::new(0);
        store.query::<Health, _>(2.0, |delta, _, _, health| {
            health.current += delta;
            calls.fetch_add(1, Ordering::Relaxed);
        });

        assert_eq!(calls.load(Ordering::Relaxed), 39);
        assert_eq!(
            store.get_component::<Health>(entities[10]).map(|h| h.current),
            Some(12.0)
        );
        assert_eq!(store.get_component::<Health>(entities[3]), None);
    }

    #[test]
    fn test_query_reports_matching_entity() {
        let store = store(4);
        for i in 0..20 {
            store.create(Health { current: i as f32, max: 0.0 });
        }
        store.query::<Health, _>(0.0, |_, _, entity, health| {
            assert_eq!(entity.id() as f32, health.current + 1.0);
        });
    }

    #[test]
    fn test_query2_visits_only_intersection() {
        let store = store(4);
        let both = store.create2(Position::default(), Velocity::new(1.0, 0.0, 0.0));
        let only_pos = store.create(Position::default());
        // Velocity reaches further than Position: extra chunks are skipped.
        for _ in 0..40 {
            store.create(Velocity::new(1.0, 0.0, 0.0));
        }

        let calls = AtomicUsize::new(0);
        store.query2::<Position, Velocity, _>(1.0, |delta, _, entity, p, v| {
            assert_eq!(entity, both);
            p.integrate(*v, delta);
            calls.fetch_add(1, Ordering::Relaxed);
        });

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(store.get_component::<Position>(both), Some(Position::new(1.0, 0.0, 0.0)));
        assert_eq!(store.get_component::<Position>(only_pos), Some(Position::default()));
    }

    #[test]
    fn test_query2_same_type_visits_nothing() {
        let store = store(4);
        store.create(Position::default());
        let calls = AtomicUsize::new(0);
        store.query2::<Position, Position, _>(1.0, |_, _, _, _, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_callback_can_use_other_types() {
        let store = store(4);
        let e = store.create2(Position::default(), Velocity::new(2.0, 0.0, 0.0));
        store.add_or_update(e, Health { current: 1.0, max: 1.0 });

        store.query::<Position, _>(1.0, |delta, store, entity, p| {
            if let Some(v) = store.get_component::<Velocity>(entity) {
                p.integrate(v, delta);
            }
            store.add_or_update(entity, Health { current: p.x, max: 1.0 });
        });

        assert_eq!(store.get_component::<Health>(e).map(|h| h.current), Some(2.0));
    }

    #[test]
    fn test_parallel_and_sequential_paths_agree() {
        fn run(threshold: usize) -> (usize, Vec<Position>) {
            let config = StoreConfig::with_chunk_bit_width(6).parallel_threshold(threshold);
            let store = DataStore::new(config).unwrap();
            let mut entities = Vec::new();
            for i in 0..300 {
                let e = store.create(Position::new(i as f32, 0.0, 0.0));
                if i % 3 != 0 {
                    store.add_or_update(e, Velocity::new(1.0, 2.0, 3.0));
                }
                entities.push(e);
            }
            let calls = AtomicUsize::new(0);
            store.query2::<Position, Velocity, _>(0.5, |delta, _, _, p, v| {
                p.integrate(*v, delta);
                calls.fetch_add(1, Ordering::Relaxed);
            });
            let positions = entities
                .iter()
                .map(|&e| store.get_component::<Position>(e).unwrap())
                .collect();
            (calls.load(Ordering::Relaxed), positions)
        }

        let sequential = run(usize::MAX);
        let parallel = run(0);
        assert_eq!(sequential.0, 200);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_concurrent_creates_and_queries() {
        let store = store(6);
        rayon::scope(|s| {
            for _ in 0..4 {
                s.spawn(|_| {
                    for i in 0..500 {
                        store.create2(Position::new(i as f32, 0.0, 0.0), Velocity::new(1.0, 0.0, 0.0));
                    }
                });
            }
            s.spawn(|_| {
                for _ in 0..20 {
                    store.query2::<Velocity, Position, _>(0.0, |_, _, _, _, _| {});
                }
            });
        });

        assert_eq!(store.entity_count(), 2000);
        let calls = AtomicUsize::new(0);
        store.query2::<Position, Velocity, _>(1.0, |_, _, _, _, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(calls.load(Ordering::Relaxed), 2000);
    }

    #[test]
    fn test_query_callback_reads_same_type() {
        let store = store(4);
        let first = store.create2(Health { current: 10.0, max: 10.0 }, Velocity::new(1.0, 0.0, 0.0));
        for i in 1..8 {
            store.create2(Health { current: i as f32, max: 0.0 }, Velocity::default());
        }

        store.query::<Health, _>(0.0, |_, store, entity, health| {
            let leader = store.get_component::<Health>(first).unwrap();
            assert_eq!(store.get_component::<Health>(entity), Some(*health));
            health.max = leader.current;
        });
        assert!(store.find::<Health, _>(|h| h.max != 10.0).is_none());

        store.query2::<Health, Velocity, _>(0.0, |_, store, entity, health, v| {
            assert_eq!(store.get_component::<Velocity>(entity), Some(*v));
            *v = store.get_component::<Velocity>(first).unwrap();
            health.current = store.get_component::<Health>(first).unwrap().max;
        });
        assert!(store.find::<Velocity, _>(|v| v.x != 1.0).is_none());
        assert!(store.find::<Health, _>(|h| h.current != 10.0).is_none());
    }

    #[test]
    fn test_query_callback_deletes_current_entity() {
        let store = store(4);
        let entities: Vec<_> = (0..20)
            .map(|i| store.create(Health { current: i as f32, max: 10.0 }))
            .collect();

        store.query::<Health, _>(0.0, |_, store, entity, health| {
            if health.current >= 10.0 {
                health.current = -1.0;
                assert!(store.delete(entity));
            } else {
                health.current += 100.0;
            }
        });

        assert_eq!(store.entity_count(), 10);
        for (i, &e) in entities.iter().enumerate() {
            if i < 10 {
                assert_eq!(store.get_component::<Health>(e).map(|h| h.current), Some(i as f32 + 100.0));
            } else {
                assert!(!store.is_alive(e));
                assert_eq!(store.get_component::<Health>(e), None);
            }
        }
    }

    #[test]
    fn test_query2_callback_deletes_current_entity() {
        let store = store(4);
        for i in 0..12 {
            store.create2(Position::new(i as f32, 0.0, 0.0), Velocity::new(1.0, 0.0, 0.0));
        }

        store.query2::<Position, Velocity, _>(1.0, |delta, store, entity, p, v| {
            p.integrate(*v, delta);
            if p.x > 6.5 {
                store.delete(entity);
            }
        });

        assert_eq!(store.entity_count(), 6);
        assert_eq!(store.chunk_count::<Position>(), 1);
        let calls = AtomicUsize::new(0);
        store.query::<Position, _>(0.0, |_, _, _, p| {
            assert!(p.x <= 6.5);
            calls.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(calls.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn test_query_callback_spawns_into_visited_chunk() {
        let store = store(4);
        for _ in 0..3 {
            store.create(Health { current: 1.0, max: 1.0 });
        }

        let calls = AtomicUsize::new(0);
        store.query::<Health, _>(0.0, |_, store, _, _| {
            store.create(Health { current: 2.0, max: 2.0 });
            calls.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert_eq!(store.entity_count(), 6);

        store.create2(Health::default(), Velocity::default());
        store.query2::<Health, Velocity, _>(0.0, |_, store, _, _, _| {
            store.create2(Health::default(), Velocity::default());
            calls.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(calls.load(Ordering::Relaxed), 4);
        assert_eq!(store.entity_count(), 8);
    }

    #[test]
    fn test_unchanged_row_keeps_store_write() {
        let store = store(4);
        let e = store.create2(Position::default(), Velocity::new(1.0, 0.0, 0.0));

        store.query2::<Position, Velocity, _>(1.0, |delta, store, entity, p, v| {
            p.integrate(*v, delta);
            store.add_or_update(entity, Velocity::new(0.0, 3.0, 0.0));
        });

        assert_eq!(store.get_component::<Position>(e), Some(Position::new(1.0, 0.0, 0.0)));
        assert_eq!(store.get_component::<Velocity>(e), Some(Velocity::new(0.0, 3.0, 0.0)));
    }

    #[test]
    fn test_parallel_callbacks_reenter_store() {
        let config = StoreConfig::with_chunk_bit_width(6).parallel_threshold(0);
        let store = DataStore::new(config).unwrap();
        let entities: Vec<_> = (0..300)
            .map(|i| store.create2(Position::new(i as f32, 0.0, 0.0), Velocity::new(1.0, 0.0, 0.0)))
            .collect();

        for _ in 0..10 {
            store.query2::<Position, Velocity, _>(1.0, |delta, store, entity, p, v| {
                let neighbour = Entity::from_raw(entity.id() % 300 + 1);
                assert!(store.get_component::<Position>(neighbour).is_some());
                assert!(store.has::<Velocity>(neighbour));
                p.integrate(*v, delta);
                store.add_or_update(entity, Health { current: p.x, max: 0.0 });
            });
            store.query::<Health, _>(0.0, |_, store, entity, health| {
                health.max = store.get_component::<Position>(entity).map_or(-1.0, |p| p.x);
            });
        }

        for (i, &e) in entities.iter().enumerate() {
            let expected = i as f32 + 10.0;
            assert_eq!(store.get_component::<Position>(e).map(|p| p.x), Some(expected));
            assert_eq!(
                store.get_component::<Health>(e),
                Some(Health { current: expected, max: expected })
            );
        }
    }

    #[test]
    fn test_components_of_unallocated_ids_stay_hidden() {
        let store = store(4);
        let stray = Entity::from_raw(5);
        store.add_or_update(stray, Health { current: 1.0, max: 1.0 });

        assert_eq!(store.get_component::<Health>(stray), Some(Health { current: 1.0, max: 1.0 }));
        assert!(store.get(stray).is_empty());
        assert_eq!(store.find::<Health, _>(|_| true), None);
        store.query::<Health, _>(0.0, |_, _, _, _| panic!("stray row visited"));

        assert!(!store.delete(stray));
        assert!(!store.has::<Health>(stray));
    }

    #[test]
    fn test_exhausted_ids_yield_null() {
        let store = DataStore {
            allocator: EntityAllocator::starting_after(u32::MAX),
            ..store(4)
        };
        assert!(store.create(Health::default()).is_null());
        assert!(store.create2(Health::default(), Position::default()).is_null());
        assert!(store.new_entity().is_null());

        assert_eq!(store.entity_count(), 0);
        assert_eq!(store.chunk_count::<Health>(), 0);
        assert_eq!(store.last_id(), u32::MAX);
    }
}
