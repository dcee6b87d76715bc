//! # Configuration
//!
//! Store geometry, the parallel iteration threshold and the worker pool size.
//! Loaded once at startup, either built in code or parsed from TOML:
//!
//! ```toml
//! worker_threads = 4
//!
//! [store]
//! chunk_bit_width = 14
//! parallel_threshold = 20000
//! ```
//!
//! Missing keys fall back to their defaults.

use serde::Deserialize;

use crate::error::{ConfigError, StoreError, StoreResult};

/// Largest accepted chunk bit width (chunks of 2^30 rows).
pub const MAX_CHUNK_BIT_WIDTH: u32 = 30;

/// Default chunk bit width (65,536 rows per chunk).
pub const DEFAULT_CHUNK_BIT_WIDTH: u32 = 16;

/// Default live-row count above which a chunk is iterated in parallel.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 30_000;

/// Data store settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Rows per chunk as a power of two.
    pub chunk_bit_width: u32,
    /// Chunks with more live rows than this are iterated with a parallel
    /// loop; smaller ones sequentially.
    pub parallel_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_bit_width: DEFAULT_CHUNK_BIT_WIDTH,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl StoreConfig {
    /// Default settings with a different chunk bit width.
    #[must_use]
    pub fn with_chunk_bit_width(chunk_bit_width: u32) -> Self {
        Self {
            chunk_bit_width,
            ..Self::default()
        }
    }

    /// Replaces the parallel threshold.
    #[must_use]
    pub fn parallel_threshold(mut self, rows: usize) -> Self {
        self.parallel_threshold = rows;
        self
    }

    /// Rows per chunk.
    #[inline]
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        1 << self.chunk_bit_width
    }

    /// Checks the chunk geometry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ChunkBitWidthTooLarge`] above
    /// [`MAX_CHUNK_BIT_WIDTH`].
    pub fn validate(&self) -> StoreResult<()> {
        if self.chunk_bit_width > MAX_CHUNK_BIT_WIDTH {
            return Err(StoreError::ChunkBitWidthTooLarge {
                requested: self.chunk_bit_width,
                max: MAX_CHUNK_BIT_WIDTH,
            });
        }
        Ok(())
    }
}

/// World settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Settings of the owned data store.
    pub store: StoreConfig,
    /// Worker threads for system fan-out. `None` lets rayon pick.
    pub worker_threads: Option<usize>,
}

impl WorldConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown keys.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }
}
