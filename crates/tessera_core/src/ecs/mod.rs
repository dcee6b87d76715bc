//! # Entity Component System
//!
//! Per-component-type columnar storage split into fixed-size chunks.
//!
//! ## Design Philosophy
//!
//! - Entity ids map to a (chunk, row) pair with a shift, never a lookup
//! - Stores grow lazily by whole chunks and never shrink or reorder
//! - Components are plain data; behavior lives in systems
//! - Queries push rows into caller callbacks and write mutations in place

mod allocator;
mod chunk;
mod component;
mod entity;
mod storage;
mod store;
mod system;
mod world;

pub use allocator::EntityAllocator;
pub use chunk::Chunk;
pub use component::{BoxedComponent, Component, Position, Velocity};
pub use entity::{ChunkAddress, Entity};
pub use storage::{ChunkedStore, ErasedStore, SharedChunk};
pub use store::DataStore;
pub use system::{ComponentSystem, Each, EachPair, EntitySystem, PairSystem};
pub use world::{World, WorldBuilder};
