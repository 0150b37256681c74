//! Error types for clockpool.

use thiserror::Error;

use super::PageId;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors surfaced by the page cache and its disk collaborators.
///
/// Expected, recoverable conditions such as unpinning a page that is not
/// resident are reported as plain `bool` results by the buffer pool and never
/// show up here.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page does not exist on disk (never allocated or deallocated).
    #[error("{0} not found")]
    PageNotFound(PageId),

    /// No free frame and no evictable frame: every frame is pinned.
    #[error("buffer pool exhausted: all frames are pinned")]
    PoolExhausted,

    /// The page is pinned and cannot be deleted.
    #[error("{0} is in use")]
    PageInUse(PageId),

    /// The page id is the sentinel or lies outside the addressable range.
    #[error("invalid page id: {0}")]
    InvalidPageId(PageId),

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
