//! # Chunks
//!
//! Fixed-capacity slab of component values with a parallel existence array.
//!
//! ```text
//! values: [C0, C1, C2, C3, ...]   (1 << chunk_bit_width slots)
//! exists: [ T,  F,  T,  F, ...]
//! live:   2
//! ```
//!
//! A chunk never resizes. A slot whose flag is false is logically empty; its
//! bytes are zeroed when the flag is cleared so a reader that skips the flag
//! check never sees a previous tenant's data.

use super::component::Component;

/// Fixed-size block of component slots.
#[derive(Debug)]
pub struct Chunk<T: Component> {
    values: Box<[T]>,
    exists: Box<[bool]>,
    live: usize,
}

impl<T: Component> Chunk<T> {
    /// Allocates an empty chunk with `1 << chunk_bit_width` slots.
    #[must_use]
    pub fn new(chunk_bit_width: u32) -> Self {
        let len = 1usize << chunk_bit_width;
        Self {
            values: vec![T::default(); len].into_boxed_slice(),
            exists: vec![false; len].into_boxed_slice(),
            live: 0,
        }
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false: chunks have at least one slot.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of slots whose existence flag is set.
    #[inline]
    #[must_use]
    pub fn live(&self) -> usize {
        self.live
    }

    /// Writes a slot.
    ///
    /// Setting keeps the live count in step with flag transitions only, so
    /// overwriting a present value or clearing an absent one leaves it alone.
    #[inline]
    pub fn set(&mut self, row: usize, value: T, exists: bool) {
        let was = self.exists[row];
        if exists {
            self.values[row] = value;
            if !was {
                self.live += 1;
            }
        } else {
            self.values[row] = T::zeroed();
            if was {
                self.live -= 1;
            }
        }
        self.exists[row] = exists;
    }

    /// Returns the value at `row` if its flag is set.
    #[inline]
    #[must_use]
    pub fn get(&self, row: usize) -> Option<T> {
        match self.exists.get(row) {
            Some(true) => Some(self.values[row]),
            _ => None,
        }
    }

    /// Overwrites a present slot.
    ///
    /// Returns `false` and leaves the slot alone when its flag is clear, so a
    /// value copied out before a concurrent remove is not resurrected.
    #[inline]
    pub fn update(&mut self, row: usize, value: T) -> bool {
        match self.exists.get(row) {
            Some(true) => {
                self.values[row] = value;
                true
            }
            _ => false,
        }
    }

    /// Checks the existence flag at `row`.
    #[inline]
    #[must_use]
    pub fn contains(&self, row: usize) -> bool {
        self.exists.get(row).copied().unwrap_or(false)
    }

    /// Raw slot values, including empty slots.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Existence flags.
    #[inline]
    #[must_use]
    pub fn exists(&self) -> &[bool] {
        &self.exists
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::Position;
    use bytemuck::Zeroable;

    #[test]
    fn test_chunk_creation() {
        let chunk: Chunk<Position> = Chunk::new(4);
        assert_eq!(chunk.len(), 16);
        assert_eq!(chunk.live(), 0);
        assert!(chunk.exists().iter().all(|e| !e));
    }

    #[test]
    fn test_chunk_live_count_tracks_transitions() {
        let mut chunk: Chunk<Position> = Chunk::new(4);
        chunk.set(3, Position::new(1.0, 0.0, 0.0), true);
        chunk.set(3, Position::new(2.0, 0.0, 0.0), true);
        assert_eq!(chunk.live(), 1);
        assert_eq!(chunk.get(3), Some(Position::new(2.0, 0.0, 0.0)));

        chunk.set(5, Position::default(), false);
        assert_eq!(chunk.live(), 1);

        chunk.set(3, Position::default(), false);
        chunk.set(3, Position::default(), false);
        assert_eq!(chunk.live(), 0);
        assert_eq!(chunk.get(3), None);
    }

    #[test]
    fn test_cleared_slot_is_zeroed() {
        let mut chunk: Chunk<Position> = Chunk::new(2);
        chunk.set(1, Position::new(9.0, 9.0, 9.0), true);
        chunk.set(1, Position::new(9.0, 9.0, 9.0), false);
        assert_eq!(chunk.values()[1], Position::zeroed());
        assert!(!chunk.contains(1));
        assert!(!chunk.contains(100));
    }

    #[test]
    fn test_update_skips_cleared_slot() {
        let mut chunk: Chunk<Position> = Chunk::new(2);
        assert!(!chunk.update(0, Position::new(1.0, 0.0, 0.0)));
        assert_eq!(chunk.live(), 0);
        assert_eq!(chunk.values()[0], Position::zeroed());

        chunk.set(0, Position::default(), true);
        assert!(chunk.update(0, Position::new(2.0, 0.0, 0.0)));
        assert_eq!(chunk.get(0), Some(Position::new(2.0, 0.0, 0.0)));
        assert_eq!(chunk.live(), 1);
    }
}
