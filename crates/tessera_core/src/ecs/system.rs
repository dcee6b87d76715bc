//! # Entity Systems
//!
//! A system is a unit of per-tick behavior. The world only sees
//! [`EntitySystem`]: one `tick` per frame against the shared store.
//!
//! Most systems touch one or two component types for every entity that has
//! them. Those are written against [`ComponentSystem`] or [`PairSystem`] and
//! wrapped in [`Each`] / [`EachPair`], whose `tick` is a single query with
//! the author's `on_tick` as the per-row callback:
//!
//! ```rust,ignore
//! struct Movement;
//!
//! impl PairSystem for Movement {
//!     type First = Position;
//!     type Second = Velocity;
//!
//!     fn on_tick(&self, delta: f32, _: &DataStore, _: Entity, p: &mut Position, v: &mut Velocity) {
//!         p.integrate(*v, delta);
//!     }
//! }
//!
//! world.add_system(EachPair(Movement))?;
//! ```
//!
//! Systems hold no cross-tick state beyond what their author caches, and
//! `on_tick` may run on several threads at once for large chunks.

use super::component::Component;
use super::entity::Entity;
use super::store::DataStore;

/// Behavior the world runs once per tick.
pub trait EntitySystem: Send + Sync + 'static {
    /// Runs the system against the store.
    fn tick(&self, delta: f32, store: &DataStore);

    /// Name used in logs and errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Per-entity behavior over one component type.
pub trait ComponentSystem: Send + Sync + 'static {
    /// Component the system iterates.
    type Component: Component;

    /// Called for every entity that has `Self::Component`.
    fn on_tick(&self, delta: f32, store: &DataStore, entity: Entity, component: &mut Self::Component);
}

/// Per-entity behavior over two component types.
pub trait PairSystem: Send + Sync + 'static {
    /// First iterated component.
    type First: Component;
    /// Second iterated component.
    type Second: Component;

    /// Called for every entity that has both components.
    fn on_tick(
        &self,
        delta: f32,
        store: &DataStore,
        entity: Entity,
        first: &mut Self::First,
        second: &mut Self::Second,
    );
}

/// Runs a [`ComponentSystem`] as an [`EntitySystem`].
#[derive(Debug, Default)]
pub struct Each<S>(pub S);

impl<S: ComponentSystem> EntitySystem for Each<S> {
    fn tick(&self, delta: f32, store: &DataStore) {
        store.query::<S::Component, _>(delta, |delta, store, entity, component| {
            self.0.on_tick(delta, store, entity, component);
        });
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<S>()
    }
}

/// Runs a [`PairSystem`] as an [`EntitySystem`].
#[derive(Debug, Default)]
pub struct EachPair<S>(pub S);

impl<S: PairSystem> EntitySystem for EachPair<S> {
    fn tick(&self, delta: f32, store: &DataStore) {
        store.query2::<S::First, S::Second, _>(delta, |delta, store, entity, first, second| {
            self.0.on_tick(delta, store, entity, first, second);
        });
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<S>()
    }
}
