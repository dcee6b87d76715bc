//! # Entity Handles
//!
//! Entities are plain integer handles. They carry no payload: every piece of
//! state lives in the per-type chunked stores, addressed by the handle.
//!
//! ## Addressing
//!
//! An entity's slot is `id - 1` (id `0` is the null handle and owns no slot).
//! The slot is split into a chunk index and a row with a shift and a
//! subtraction, so chunk sizes are always powers of two:
//!
//! ```text
//! chunk_bit_width = 4 (chunk size 16)
//!
//! id:     1 ........ 16 | 17 ....... 32 | 33 ...
//! chunk:  0             | 1             | 2
//! row:    0 ........ 15 | 0 ........ 15 | 0 ...
//! ```
//!
//! The mapping depends on the id alone, never on allocation order, so chunk
//! `i` of every component store covers the same id range.

use std::fmt;

/// Opaque handle identifying one logical row across all component stores.
///
/// `Entity::NULL` (id `0`) never refers to a live entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Entity(u32);

impl Entity {
    /// The null handle.
    pub const NULL: Self = Self(0);

    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Checks if this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Location of an entity's row inside a chunked store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkAddress {
    /// Index of the chunk in the store's chunk list.
    pub chunk: usize,
    /// Row inside that chunk, always `< 1 << chunk_bit_width`.
    pub row: usize,
}

impl ChunkAddress {
    /// Computes the address of a non-null entity.
    ///
    /// Returns `None` for `Entity::NULL`.
    #[inline]
    #[must_use]
    pub const fn of(entity: Entity, chunk_bit_width: u32) -> Option<Self> {
        if entity.is_null() {
            return None;
        }
        let slot = (entity.0 - 1) as usize;
        let chunk = slot >> chunk_bit_width;
        Some(Self {
            chunk,
            row: slot - (chunk << chunk_bit_width),
        })
    }

    /// Inverse of [`ChunkAddress::of`].
    #[inline]
    #[must_use]
    pub const fn entity(self, chunk_bit_width: u32) -> Entity {
        // Slots are derived from u32 ids, so the sum always fits.
        #[allow(clippy::cast_possible_truncation)]
        let slot = ((self.chunk << chunk_bit_width) + self.row) as u32;
        Entity(slot + 1)
    }
}
