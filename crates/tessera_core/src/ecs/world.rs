//! # ECS World
//!
//! Owns the [`DataStore`] and the registered systems, and drives one
//! fork-join pass over the systems per frame.
//!
//! Systems are registered explicitly at the composition root, either one by
//! one with [`World::add_system`] or as a manifest through [`WorldBuilder`].
//! There is no ordering between systems inside one tick: behavior that
//! needs ordering must be split across ticks.

use std::any::TypeId;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::component::Component;
use super::store::DataStore;
use super::system::EntitySystem;
use crate::config::WorldConfig;
use crate::error::{WorldError, WorldResult};

/// The container for all game state and the systems that update it.
///
/// # Example
///
/// ```rust,ignore
/// let mut world = World::new(WorldConfig::default())?;
/// world.add_system(EachPair(Movement))?;
///
/// let e = world.store().create2(Position::default(), Velocity::new(1.0, 0.0, 0.0));
/// world.tick(1.0 / 60.0);
/// ```
pub struct World {
    store: DataStore,
    systems: Vec<Box<dyn EntitySystem>>,
    registered: HashSet<TypeId>,
    pool: ThreadPool,
    ticks: AtomicU64,
}

impl World {
    /// Creates a world with no systems.
    ///
    /// # Errors
    ///
    /// Fails if the store configuration is invalid or the worker pool cannot
    /// be started.
    pub fn new(config: WorldConfig) -> WorldResult<Self> {
        let store = DataStore::new(config.store)?;
        let mut pool = ThreadPoolBuilder::new().thread_name(|i| format!("tessera-worker-{i}"));
        if let Some(threads) = config.worker_threads {
            pool = pool.num_threads(threads);
        }
        let pool = pool.build()?;

        tracing::info!(
            chunk_bit_width = config.store.chunk_bit_width,
            parallel_threshold = config.store.parallel_threshold,
            workers = pool.current_num_threads(),
            "world created"
        );

        Ok(Self {
            store,
            systems: Vec::new(),
            registered: HashSet::new(),
            pool,
            ticks: AtomicU64::new(0),
        })
    }

    /// Starts a manifest-style builder.
    #[must_use]
    pub fn builder() -> WorldBuilder {
        WorldBuilder::default()
    }

    /// The world's data store.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// Number of registered systems.
    #[inline]
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Number of completed ticks.
    #[inline]
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Registers a system.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::SystemAlreadyRegistered`] if a system of the
    /// same concrete type is already registered.
    pub fn add_system<S: EntitySystem>(&mut self, system: S) -> WorldResult<()> {
        self.add_boxed(TypeId::of::<S>(), Box::new(system))
    }

    fn add_boxed(&mut self, type_id: TypeId, system: Box<dyn EntitySystem>) -> WorldResult<()> {
        if !self.registered.insert(type_id) {
            tracing::warn!(system = system.name(), "duplicate system rejected");
            return Err(WorldError::SystemAlreadyRegistered(system.name()));
        }
        tracing::info!(system = system.name(), "system registered");
        self.systems.push(system);
        Ok(())
    }

    /// Runs every registered system once, in parallel on the worker pool.
    ///
    /// Returns when all systems have finished.
    pub fn tick(&self, delta: f32) {
        let tick = self.ticks.load(Ordering::Relaxed);
        let _span = tracing::trace_span!("world_tick", tick, systems = self.systems.len()).entered();

        self.pool.install(|| {
            self.systems
                .par_iter()
                .for_each(|system| system.tick(delta, &self.store));
        });

        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

/// Explicit manifest of a world's component types and systems.
///
/// # Example
///
/// ```rust,ignore
/// let world = World::builder()
///     .config(WorldConfig::from_toml_str(&settings)?)
///     .component::<Position>()
///     .component::<Velocity>()
///     .system(EachPair(Movement))
///     .build()?;
/// ```
#[derive(Default)]
pub struct WorldBuilder {
    config: WorldConfig,
    components: Vec<fn(&DataStore)>,
    systems: Vec<(TypeId, Box<dyn EntitySystem>)>,
}

impl WorldBuilder {
    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: WorldConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates the store for `T` when the world is built.
    #[must_use]
    pub fn component<T: Component>(mut self) -> Self {
        self.components.push(DataStore::register::<T>);
        self
    }

    /// Adds a system to the manifest.
    #[must_use]
    pub fn system<S: EntitySystem>(mut self, system: S) -> Self {
        self.systems.push((TypeId::of::<S>(), Box::new(system)));
        self
    }

    /// Builds the world.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or if the manifest lists the same
    /// system type twice.
    pub fn build(self) -> WorldResult<World> {
        let mut world = World::new(self.config)?;
        for register in self.components {
            register(&world.store);
        }
        for (type_id, system) in self.systems {
            world.add_boxed(type_id, system)?;
        }
        tracing::info!(
            components = world.store.component_type_count(),
            systems = world.system_count(),
            "world built from manifest"
        );
        Ok(world)
    }
}
