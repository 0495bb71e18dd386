//! Database configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_MODIFICATION_LOG_CAPACITY, MIN_CHUNK_SIZE};
use crate::error::{NdError, NdResult};

/// Configuration for an Nd database and the session that owns it.
///
/// # Example
///
/// ```rust
/// use nd_common::config::NdConfig;
///
/// let config = NdConfig::default().with_versions(3, 5, 5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NdConfig {
    /// Size of each storage chunk in bytes. Must be a power of 2.
    /// Default: 65536 (64 KB)
    pub chunk_size: usize,

    /// Oldest schema version this build can read.
    pub min_version: u32,

    /// Newest schema version this build can read.
    pub max_version: u32,

    /// Schema version written to newly created stores.
    pub current_version: u32,

    /// Open the store permanently read-only. Write locks are forbidden.
    /// Default: false
    pub read_only: bool,

    /// Persist dirty chunks whenever the outermost write lock is released.
    /// Default: true
    pub flush_on_write_unlock: bool,

    /// Number of writes remembered for corruption reports. 0 disables the log.
    /// Default: 4096
    pub modification_log_capacity: usize,

    /// Panic when a node is read or written without the matching lock.
    /// Default: on in debug builds, off in release builds.
    pub lock_assertions: bool,
}

impl Default for NdConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_version: 1,
            max_version: 1,
            current_version: 1,
            read_only: false,
            flush_on_write_unlock: true,
            modification_log_capacity: DEFAULT_MODIFICATION_LOG_CAPACITY,
            lock_assertions: cfg!(debug_assertions),
        }
    }
}

impl NdConfig {
    /// Creates a minimal configuration for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            chunk_size: MIN_CHUNK_SIZE,
            flush_on_write_unlock: false, // Faster tests
            modification_log_capacity: 256,
            lock_assertions: true,
            ..Default::default()
        }
    }

    /// Sets the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the readable version range and the version for new stores.
    #[must_use]
    pub fn with_versions(mut self, min: u32, max: u32, current: u32) -> Self {
        self.min_version = min;
        self.max_version = max;
        self.current_version = current;
        self
    }

    /// Opens the store read-only.
    #[must_use]
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Sets whether dirty chunks are persisted on write unlock.
    #[must_use]
    pub fn with_flush_on_write_unlock(mut self, flush: bool) -> Self {
        self.flush_on_write_unlock = flush;
        self
    }

    /// Sets the modification log capacity.
    #[must_use]
    pub fn with_modification_log_capacity(mut self, capacity: usize) -> Self {
        self.modification_log_capacity = capacity;
        self
    }

    /// Enables or disables lock assertions.
    #[must_use]
    pub fn with_lock_assertions(mut self, enabled: bool) -> Self {
        self.lock_assertions = enabled;
        self
    }

    /// Returns true if a store at `version` can be opened without a reset.
    #[must_use]
    pub fn supports_version(&self, version: u32) -> bool {
        (self.min_version..=self.max_version).contains(&version)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> NdResult<()> {
        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(NdError::invalid_config(format!(
                "chunk_size must be at least {MIN_CHUNK_SIZE} bytes"
            )));
        }

        if !self.chunk_size.is_power_of_two() {
            return Err(NdError::invalid_config("chunk_size must be a power of 2"));
        }

        if self.min_version > self.max_version {
            return Err(NdError::invalid_config(
                "min_version must not exceed max_version",
            ));
        }

        if !self.supports_version(self.current_version) {
            return Err(NdError::invalid_config(
                "current_version must lie within [min_version, max_version]",
            ));
        }

        Ok(())
    }
}
