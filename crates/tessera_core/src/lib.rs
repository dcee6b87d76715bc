//! # Tessera Core
//!
//! Chunked entity-component data store:
//! - Per-type columnar storage, created lazily on first use
//! - Fixed-size chunks addressed by a shift of the entity id
//! - Push-style queries over one or two component types, with large chunks
//!   iterated in parallel
//! - A world that fans its systems out across a worker pool once per tick
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_core::{DataStore, Position, Velocity};
//!
//! let store = DataStore::with_chunk_bit_width(16)?;
//! let e = store.create(Position::new(0.0, 0.0, 0.0));
//! store.add_or_update(e, Velocity::new(1.0, 0.0, 0.0));
//!
//! store.query2::<Position, Velocity, _>(1.0, |dt, _, _, p, v| p.integrate(*v, dt));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;

pub use config::{StoreConfig, WorldConfig, MAX_CHUNK_BIT_WIDTH};
pub use ecs::{
    BoxedComponent, Chunk, ChunkAddress, ChunkedStore, Component, ComponentSystem, DataStore,
    Each, EachPair, Entity, EntityAllocator, EntitySystem, ErasedStore, PairSystem, Position,
    SharedChunk, Velocity, World, WorldBuilder,
};
pub use error::{ConfigError, StoreError, StoreResult, WorldError, WorldResult};
