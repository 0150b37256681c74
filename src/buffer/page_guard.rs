//! Access to pages held in the buffer pool.
//!
//! - [`PageHandle`] - What `fetch_page` / `new_page` return. Does not unpin
//!   on its own; pair every handle with one `unpin_page` call.
//! - [`PageReadGuard`] - Shared read access, unpins on drop
//! - [`PageWriteGuard`] - Exclusive write access, marks dirty and unpins on
//!   drop
//!
//! Guards release the frame's data latch *before* unpinning, so the pool
//! latch is never requested while a data latch is held.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use super::buffer_pool_manager::BufferPoolManager;
use super::frame::Frame;
use crate::common::{FrameId, PageId};
use crate::storage::page::Page;

/// A reference to a pinned, resident page.
///
/// The handle stays valid as long as the caller holds the pin it was
/// returned with. Copying a handle does not take another pin.
///
/// # Example
/// ```
/// use clockpool::{BufferPoolManager, MemoryDiskManager};
///
/// let bpm = BufferPoolManager::new(4, MemoryDiskManager::new());
/// let handle = bpm.new_page().unwrap();
/// handle.write().as_mut_slice()[0] = 7;
/// assert_eq!(handle.pin_count(), 1);
///
/// let page_id = handle.page_id();
/// assert!(bpm.unpin_page(page_id, true));
/// ```
#[derive(Clone, Copy)]
pub struct PageHandle<'a> {
    frame: &'a Frame,
    frame_id: FrameId,
    page_id: PageId,
}

impl<'a> PageHandle<'a> {
    pub(crate) fn new(frame: &'a Frame, frame_id: FrameId, page_id: PageId) -> Self {
        Self {
            frame,
            frame_id,
            page_id,
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Current pin count of the frame (diagnostic).
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.frame.pin_count()
    }

    /// Whether the frame holds changes not yet written to disk.
    ///
    /// Callers report their own changes through `unpin_page(.., true)`.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.frame.is_dirty()
    }

    /// Shared access to the page bytes.
    ///
    /// Drop the returned guard before calling back into the pool.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'a, Page> {
        self.frame.page()
    }

    /// Exclusive access to the page bytes.
    ///
    /// Drop the returned guard before calling back into the pool.
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'a, Page> {
        self.frame.page_mut()
    }
}

impl std::fmt::Debug for PageHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("page_id", &self.page_id)
            .field("frame_id", &self.frame_id)
            .finish()
    }
}

/// Unpins its page when dropped.
///
/// Declared as the last field of the guards: struct fields drop in
/// declaration order, so the data latch is gone by the time this runs.
struct Pin<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    dirty: bool,
}

impl Drop for Pin<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page_id, self.dirty);
    }
}

/// Guard for read-only page access.
///
/// Multiple `PageReadGuard`s can exist for the same page simultaneously.
pub struct PageReadGuard<'a> {
    lock: RwLockReadGuard<'a, Page>,
    frame_id: FrameId,
    pin: Pin<'a>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, handle: PageHandle<'a>) -> Self {
        Self {
            lock: handle.read(),
            frame_id: handle.frame_id(),
            pin: Pin {
                bpm,
                page_id: handle.page_id(),
                dirty: false,
            },
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

/// Guard for exclusive write access to a page.
///
/// The page is marked dirty when the guard drops, whether or not it was
/// modified.
pub struct PageWriteGuard<'a> {
    lock: RwLockWriteGuard<'a, Page>,
    frame_id: FrameId,
    pin: Pin<'a>,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, handle: PageHandle<'a>) -> Self {
        Self {
            lock: handle.write(),
            frame_id: handle.frame_id(),
            pin: Pin {
                bpm,
                page_id: handle.page_id(),
                dirty: true,
            },
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        &mut self.lock
    }
}
