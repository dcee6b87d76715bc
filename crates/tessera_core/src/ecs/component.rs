//! # Component System
//!
//! Components are pure data containers with no behavior.
//! They must be plain old data so a chunk can hold them in a dense array and
//! zero a slot without running any destructor.

use std::any::{Any, TypeId};
use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Pod`: Plain old data, bitwise copyable, fixed layout
/// - `Default`: Value used to fill freshly grown chunks
/// - `Debug`: Rendered by inspection tooling through [`BoxedComponent`]
/// - `Send + Sync`: Chunks are iterated from worker threads
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {}
/// ```
pub trait Component: Pod + Default + fmt::Debug + Send + Sync + 'static {
    /// Human readable name, used in logs and by inspectors.
    #[must_use]
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A component value copied out of the store for inspection.
///
/// Produced by [`DataStore::get`](crate::DataStore::get). Boxing costs an
/// allocation per value, which is why this type never appears in the
/// query hot path.
pub struct BoxedComponent {
    type_id: TypeId,
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
    debug: String,
}

impl BoxedComponent {
    /// Boxes a component value.
    #[must_use]
    pub fn new<T: Component>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: T::type_name(),
            debug: format!("{value:?}"),
            value: Box::new(value),
        }
    }

    /// The component's `TypeId`.
    #[inline]
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The component's type name.
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Checks if the boxed value is a `T`.
    #[inline]
    #[must_use]
    pub fn is<T: Component>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Borrows the value as `T`, if it is one.
    #[inline]
    #[must_use]
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for BoxedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.debug)
    }
}

/// Position component for entities.
///
/// Represents a 3D position in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    /// X coordinate in world space.
    pub x: f32,
    /// Y coordinate in world space.
    pub y: f32,
    /// Z coordinate in world space.
    pub z: f32,
    /// Padding for alignment (ensures 16-byte stride).
    pub _padding: f32,
}

impl Component for Position {}

impl Position {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            _padding: 0.0,
        }
    }

    /// Moves this position along `velocity` for `delta` seconds.
    #[inline]
    pub fn integrate(&mut self, velocity: Velocity, delta: f32) {
        self.x += velocity.x * delta;
        self.y += velocity.y * delta;
        self.z += velocity.z * delta;
    }
}

/// Velocity component for entities.
///
/// Represents movement speed in world units per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Velocity {
    /// X velocity component.
    pub x: f32,
    /// Y velocity component.
    pub y: f32,
    /// Z velocity component.
    pub z: f32,
    /// Padding for alignment.
    pub _padding: f32,
}

impl Component for Velocity {}

impl Velocity {
    /// Creates a new velocity.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            _padding: 0.0,
        }
    }
}
