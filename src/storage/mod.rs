//! Storage layer - the disk collaborator behind the cache.
//!
//! - [`DiskManager`] - The trait the buffer pool drives
//! - [`FileDiskManager`] - Pages in a single file
//! - [`MemoryDiskManager`] - Pages in memory, for tests and embedders
//! - [`page`] - The fixed-size page buffer

mod disk_manager;
mod memory;
pub mod page;

pub use disk_manager::{DiskManager, FileDiskManager};
pub use memory::{DiskCounters, MemoryDiskManager};
