//! # Error Types
//!
//! The store has a single fatal error (bad chunk geometry at construction).
//! Absence of a component, a store or a match is never an error and is
//! reported through `Option`/`bool` instead.

use thiserror::Error;

/// Errors raised while building a [`DataStore`](crate::DataStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Chunk bit width above the supported bound.
    #[error("chunk bit width {requested} exceeds the maximum of {max}")]
    ChunkBitWidthTooLarge {
        /// The width that was asked for.
        requested: u32,
        /// The largest accepted width.
        max: u32,
    },
}

/// Errors raised while loading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The TOML document could not be parsed into a config.
    #[error("invalid configuration: {0}")]
    Parse(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Errors raised while assembling or driving a [`World`](crate::World).
#[derive(Error, Debug)]
pub enum WorldError {
    /// A system of the same concrete type is already registered.
    #[error("system already registered: {0}")]
    SystemAlreadyRegistered(&'static str),

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The data store rejected its configuration.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for data store construction.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
