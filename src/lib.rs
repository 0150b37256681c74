//! clockpool - a fixed-size page cache with CLOCK eviction.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │        callers: index / table / record managers                 │
//! │     fetch_page · unpin_page · new_page · delete_page · flush    │
//! └─────────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Buffer Pool (buffer/)                        │
//! │   BufferPoolManager: page table + free list + frames + stats    │
//! │   ┌─────────────────────────────────────────────────────────┐   │
//! │   │  ClockReplacer: reference bits + persisted clock hand   │   │
//! │   └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Storage (storage/)                           │
//! │     DiskManager trait: FileDiskManager | MemoryDiskManager      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, Error, config)
//! - [`buffer`] - Buffer pool manager and eviction policy
//! - [`storage`] - Disk collaborators and the page buffer
//!
//! # Quick Start
//! ```no_run
//! use clockpool::{BufferPoolManager, FileDiskManager};
//!
//! let disk = FileDiskManager::open_or_create("my_database.db").unwrap();
//! let bpm = BufferPoolManager::new(64, disk);
//!
//! let handle = bpm.new_page().unwrap();
//! handle.write().as_mut_slice()[..5].copy_from_slice(b"hello");
//! let page_id = handle.page_id();
//! bpm.unpin_page(page_id, true);
//!
//! bpm.flush_page(page_id).unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod storage;

pub use common::config::{BufferPoolConfig, PAGE_SIZE};
pub use common::{Error, FrameId, PageId, Result};

pub use buffer::{
    BufferPoolManager, BufferPoolStats, FlushSummary, PageHandle, PageReadGuard, PageWriteGuard,
    StatsSnapshot,
};
pub use storage::page::Page;
pub use storage::{DiskManager, FileDiskManager, MemoryDiskManager};
