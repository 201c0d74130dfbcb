//! Protocol limits.

/// Default per-entry size limit in bytes.
pub const DEFAULT_MAX_VALUE_SIZE: usize = 32_000;

/// Default number of cached permission decisions.
pub const DEFAULT_PERMISSION_CACHE_CAPACITY: usize = 4096;

/// Deployment parameters for the protocol handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreConfig {
    /// Largest serialized value `set`/`update` accept. A value of exactly
    /// this many bytes is accepted.
    pub max_value_size: usize,
    /// Permission decisions kept in the LRU cache. Zero disables caching.
    pub permission_cache_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            permission_cache_capacity: DEFAULT_PERMISSION_CACHE_CAPACITY,
        }
    }
}
