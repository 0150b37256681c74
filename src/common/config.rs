//! Configuration for clockpool.

use super::{Error, Result};

/// Size of a page in bytes (4KB).
///
/// Matches the OS page size on most systems, so frames can be handed to the
/// kernel for aligned I/O without copying.
pub const PAGE_SIZE: usize = 4096;

/// Number of addressable pages. `u32::MAX` is reserved for `PageId::INVALID`.
pub const MAX_PAGES: u64 = u32::MAX as u64;

/// Pool size used by [`BufferPoolConfig::default`].
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Settings for a [`BufferPoolManager`](crate::buffer::BufferPoolManager).
///
/// # Example
/// ```
/// use clockpool::common::config::BufferPoolConfig;
///
/// let config = BufferPoolConfig::new(16);
/// assert!(config.validate().is_ok());
/// assert!(BufferPoolConfig::new(0).validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Number of frames allocated up front.
    pub pool_size: usize,
}

impl BufferPoolConfig {
    /// Create a config with the given number of frames.
    pub fn new(pool_size: usize) -> Self {
        Self { pool_size }
    }

    /// Check that the config describes a usable pool.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::InvalidConfig("pool_size must be > 0".into()));
        }
        Ok(())
    }

    /// Bytes of page data held by a pool of this size.
    pub fn memory_bytes(&self) -> usize {
        self.pool_size * PAGE_SIZE
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}
