//! Buffer pool management.
//!
//! The buffer pool is the in-memory cache between callers and disk. It
//! manages a fixed pool of frames, each holding at most one page.
//!
//! # Components
//! - [`BufferPoolManager`] - The page cache
//! - [`Frame`] - A slot in the buffer pool holding a page + metadata
//! - [`PageHandle`] - Pinned page returned by `fetch_page` / `new_page`
//! - [`PageReadGuard`] / [`PageWriteGuard`] - RAII guards for page access
//! - [`BufferPoolStats`] - Performance statistics
//! - [`replacer`] - CLOCK eviction policy

mod buffer_pool_manager;
mod frame;
mod page_guard;
pub mod replacer;
mod stats;

pub use buffer_pool_manager::{BufferPoolManager, FlushSummary};
pub use frame::Frame;
pub use page_guard::{PageHandle, PageReadGuard, PageWriteGuard};
pub use stats::{BufferPoolStats, StatsSnapshot};
