//! Buffer Pool Manager - the page caching layer.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between a [`DiskManager`] and memory
//! - Pin-based reference counting
//! - Dirty page write-back before a frame is reused
//! - CLOCK eviction once the free list is empty

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::buffer::replacer::ClockReplacer;
use crate::buffer::{BufferPoolStats, Frame, PageHandle, PageReadGuard, PageWriteGuard};
use crate::common::config::BufferPoolConfig;
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::DiskManager;

/// Everything that must change together, guarded by the pool latch.
struct PoolState {
    /// Maps resident page ids to their frames.
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page (LIFO).
    free_list: Vec<FrameId>,
    replacer: ClockReplacer,
}

/// Result of [`BufferPoolManager::flush_all_pages`].
#[derive(Debug, Default)]
pub struct FlushSummary {
    /// Pages written to disk.
    pub written: usize,
    /// Pages whose write failed. They stay dirty.
    pub failed: Vec<(PageId, Error)>,
}

impl FlushSummary {
    /// Whether every dirty page reached disk.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Manages a fixed pool of frames caching disk pages.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                    BufferPoolManager                        │
/// │  ┌─────── state: Mutex<PoolState> ──────────┐  ┌──────────┐ │
/// │  │ page_table   free_list     replacer      │  │  disk    │ │
/// │  │ PageId→Fid   Vec<FrameId>  ClockReplacer │  │  Mutex   │ │
/// │  └──────────────────────────────────────────┘  └──────────┘ │
/// │          │                                                  │
/// │          ▼                                                  │
/// │  frames: Vec<Frame>  [Frame0] [Frame1] [Frame2] ...         │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// One latch (`state`) covers the page table, free list and replacer, and
/// every change to a frame's page id, pin count or dirty flag is made while
/// holding it. A frame's bytes sit behind the frame's own `RwLock`, so pinned
/// callers read and write page data without the pool latch. The disk has its
/// own latch, always taken last. Lock order: pool latch, frame data latch,
/// disk latch.
///
/// The pool latch is only held across a data latch for frames nobody has
/// pinned (victims and freshly acquired frames). Flushing a resident page
/// pins it, drops the pool latch and only then waits for the data latch, so
/// a caller holding a guard on that page can keep calling into the pool.
///
/// No operation waits for a frame to become free: when every frame is
/// pinned, [`Error::PoolExhausted`] comes back immediately.
///
/// # Usage
/// ```
/// use clockpool::{BufferPoolManager, MemoryDiskManager};
///
/// let bpm = BufferPoolManager::new(8, MemoryDiskManager::new());
///
/// let page_id = {
///     let mut guard = bpm.new_page_write().unwrap();
///     guard.as_mut_slice()[0] = 0xAB;
///     guard.page_id()
/// }; // guard drops: page marked dirty, unpinned
///
/// let guard = bpm.fetch_page_read(page_id).unwrap();
/// assert_eq!(guard.as_slice()[0], 0xAB);
/// ```
pub struct BufferPoolManager {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,
    state: Mutex<PoolState>,
    disk: Mutex<Box<dyn DiskManager>>,
    stats: BufferPoolStats,
}

impl BufferPoolManager {
    /// Create a buffer pool with `pool_size` frames.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0. Use [`with_config`](Self::with_config) to
    /// get an error instead.
    pub fn new(pool_size: usize, disk: impl DiskManager + 'static) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        Self::build(pool_size, Box::new(disk))
    }

    /// Create a buffer pool from a validated config.
    pub fn with_config(config: BufferPoolConfig, disk: impl DiskManager + 'static) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config.pool_size, Box::new(disk)))
    }

    fn build(pool_size: usize, disk: Box<dyn DiskManager>) -> Self {
        let frames = (0..pool_size).map(|_| Frame::new()).collect();

        // Reversed so that frame 0 is handed out first.
        let free_list = (0..pool_size).rev().map(FrameId::new).collect();

        debug!(pool_size, "buffer pool created");

        Self {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
                replacer: ClockReplacer::new(pool_size),
            }),
            disk: Mutex::new(disk),
            stats: BufferPoolStats::new(),
        }
    }

    // ========================================================================
    // Public API: page access
    // ========================================================================

    /// Pin `page_id` in the pool, reading it from disk on a miss.
    ///
    /// A resident page is pinned again without any I/O or victim selection.
    /// On a miss a frame is taken from the free list or, failing that, from
    /// the replacer; a dirty victim is written back under its old id first.
    ///
    /// # Errors
    /// - `Error::InvalidPageId` for `PageId::INVALID`
    /// - `Error::PoolExhausted` if every frame is pinned
    /// - Disk errors from the write-back or the read. After a failed read
    ///   the chosen frame is empty and back on the free list.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageHandle<'_>> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.0];
            if frame.pin() == 1 {
                state.replacer.record_pinned(frame_id);
            }
            BufferPoolStats::bump(&self.stats.cache_hits);
            trace!(%page_id, %frame_id, "buffer pool hit");
            return Ok(PageHandle::new(frame, frame_id, page_id));
        }

        BufferPoolStats::bump(&self.stats.cache_misses);
        debug!(%page_id, "buffer pool miss, loading from disk");

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.0];

        let read = {
            let mut page = frame.page_mut();
            self.disk.lock().read_page(page_id, &mut page)
        };
        if let Err(e) = read {
            warn!(%page_id, %frame_id, error = %e, "page read failed");
            frame.reset();
            state.free_list.push(frame_id);
            return Err(e);
        }
        BufferPoolStats::bump(&self.stats.pages_read);

        self.install(&mut state, frame_id, page_id);
        Ok(PageHandle::new(frame, frame_id, page_id))
    }

    /// Release one pin on `page_id`.
    ///
    /// `is_dirty = true` marks the page dirty; `false` never clears an
    /// earlier mark (only a flush does). Unpinning a resident page whose pin
    /// count is already zero applies the dirty flag and is otherwise a no-op.
    ///
    /// Returns `false` if the page is not resident.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            trace!(%page_id, "unpin of non-resident page");
            return false;
        };
        let frame = &self.frames[frame_id.0];

        if is_dirty {
            frame.mark_dirty();
        }

        match frame.unpin() {
            Some(0) => state.replacer.record_unpinned(frame_id),
            Some(_) => {}
            None => trace!(%page_id, "unpin of page with zero pin count"),
        }
        true
    }

    /// Allocate a new page on disk and pin it in a zeroed frame.
    ///
    /// The frame is secured before the disk hands out an id, so an exhausted
    /// pool never consumes a page id.
    ///
    /// # Errors
    /// - `Error::PoolExhausted` if every frame is pinned
    /// - Disk errors from the victim's write-back or from allocation
    pub fn new_page(&self) -> Result<PageHandle<'_>> {
        let mut state = self.state.lock();

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.0];

        let allocated = self.disk.lock().allocate_page();
        let page_id = match allocated {
            Ok(page_id) => page_id,
            Err(e) => {
                warn!(%frame_id, error = %e, "page allocation failed");
                frame.reset();
                state.free_list.push(frame_id);
                return Err(e);
            }
        };

        frame.page_mut().reset();
        self.install(&mut state, frame_id, page_id);

        BufferPoolStats::bump(&self.stats.pages_allocated);
        debug!(%page_id, %frame_id, "allocated new page");
        Ok(PageHandle::new(frame, frame_id, page_id))
    }

    /// Remove `page_id` from the pool and deallocate it on disk.
    ///
    /// Returns `true` if the page is gone afterwards: either it was not
    /// resident to begin with, or it was unpinned and has been removed.
    /// Returns `false` if the page is pinned. Unflushed changes are
    /// discarded. A failing deallocation is logged and does not keep the page
    /// in the pool.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };
        let frame = &self.frames[frame_id.0];

        if frame.is_pinned() {
            debug!(%page_id, pin_count = frame.pin_count(), "refusing to delete pinned page");
            return false;
        }

        if let Err(e) = self.disk.lock().deallocate_page(page_id) {
            warn!(%page_id, error = %e, "page deallocation failed");
        }

        state.page_table.remove(&page_id);
        state.replacer.remove(frame_id);
        frame.reset();
        state.free_list.push(frame_id);

        BufferPoolStats::bump(&self.stats.pages_deleted);
        debug!(%page_id, %frame_id, "deleted page");
        true
    }

    // ========================================================================
    // Public API: flushing
    // ========================================================================

    /// Write `page_id` to disk if it is dirty. Pinned pages may be flushed.
    ///
    /// Returns `Ok(true)` if the page is resident, whether or not a write was
    /// needed, and `Ok(false)` if it is not. Writes show up in
    /// `stats().pages_written`.
    ///
    /// Waits for any writer holding the page's data latch to release it, so
    /// must not be called while the caller itself holds a write guard on
    /// `page_id`.
    ///
    /// # Errors
    /// Disk errors from the write; the page stays dirty.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        Ok(self.flush_resident(page_id)?.is_some())
    }

    /// Write every dirty resident page to disk.
    ///
    /// A failing page is recorded in the summary and the sweep continues.
    /// Pages evicted or deleted while the sweep runs are skipped.
    pub fn flush_all_pages(&self) -> FlushSummary {
        let resident: Vec<PageId> = self.state.lock().page_table.keys().copied().collect();

        let mut summary = FlushSummary::default();
        for page_id in resident {
            match self.flush_resident(page_id) {
                Ok(Some(true)) => summary.written += 1,
                Ok(_) => {}
                Err(e) => summary.failed.push((page_id, e)),
            }
        }

        debug!(
            written = summary.written,
            failed = summary.failed.len(),
            "flushed all dirty pages"
        );
        summary
    }

    // ========================================================================
    // Public API: RAII guards
    // ========================================================================

    /// Fetch a page for shared reading; unpinned when the guard drops.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let handle = self.fetch_page(page_id)?;
        Ok(PageReadGuard::new(self, handle))
    }

    /// Fetch a page for exclusive writing; marked dirty and unpinned when the
    /// guard drops.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let handle = self.fetch_page(page_id)?;
        Ok(PageWriteGuard::new(self, handle))
    }

    /// [`new_page`](Self::new_page) returning a write guard.
    pub fn new_page_write(&self) -> Result<PageWriteGuard<'_>> {
        let handle = self.new_page()?;
        Ok(PageWriteGuard::new(self, handle))
    }

    // ========================================================================
    // Public API: introspection
    // ========================================================================

    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Number of resident pages.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Number of frames the replacer may evict.
    pub fn evictable_count(&self) -> usize {
        self.state.lock().replacer.size()
    }

    /// Pin count of a resident page, `None` if not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id.0].pin_count())
    }

    /// Dirty flag of a resident page, `None` if not resident.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id.0].is_dirty())
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Take a frame from the free list, or evict the replacer's victim.
    ///
    /// The returned frame is empty, unpinned, clean, absent from the page
    /// table and out of the replacer. If the victim's write-back fails it is
    /// handed back to the replacer still resident.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            trace!(%frame_id, "took frame from free list");
            return Ok(frame_id);
        }

        let frame_id = state.replacer.victim().ok_or(Error::PoolExhausted)?;
        let old_page_id = self.frames[frame_id.0].page_id();

        if let Err(e) = self.write_back(frame_id, old_page_id) {
            warn!(page_id = %old_page_id, %frame_id, error = %e, "write-back failed, keeping page");
            state.replacer.record_unpinned(frame_id);
            return Err(e);
        }

        state.page_table.remove(&old_page_id);
        self.frames[frame_id.0].set_page_id(PageId::INVALID);

        BufferPoolStats::bump(&self.stats.evictions);
        debug!(page_id = %old_page_id, %frame_id, "evicted page");
        Ok(frame_id)
    }

    /// Flush a resident page without holding the pool latch across its data
    /// latch.
    ///
    /// The page is pinned and its dirty flag cleared under the pool latch,
    /// the write happens with only the data and disk latches held, and the
    /// pin is released afterwards. A writer that unpins dirty in the meantime
    /// sets the flag again. On failure the flag is restored.
    ///
    /// Returns `Ok(None)` if the page is not resident, else whether a write
    /// happened.
    fn flush_resident(&self, page_id: PageId) -> Result<Option<bool>> {
        let frame_id = {
            let mut state = self.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(None);
            };
            let frame = &self.frames[frame_id.0];
            if !frame.is_dirty() {
                return Ok(Some(false));
            }
            frame.clear_dirty();
            if frame.pin() == 1 {
                state.replacer.record_pinned(frame_id);
            }
            frame_id
        };

        let frame = &self.frames[frame_id.0];
        let written = {
            let page = frame.page();
            self.disk.lock().write_page(page_id, &page)
        };

        let mut state = self.state.lock();
        match &written {
            Ok(()) => {
                BufferPoolStats::bump(&self.stats.pages_written);
                trace!(%page_id, %frame_id, "flushed page");
            }
            Err(e) => {
                warn!(%page_id, %frame_id, error = %e, "page flush failed");
                frame.mark_dirty();
            }
        }
        if frame.unpin() == Some(0) {
            state.replacer.record_unpinned(frame_id);
        }

        written.map(|()| Some(true))
    }

    /// Make `page_id` resident in `frame_id` with a pin count of one.
    fn install(&self, state: &mut PoolState, frame_id: FrameId, page_id: PageId) {
        let frame = &self.frames[frame_id.0];
        frame.set_page_id(page_id);
        frame.pin();
        state.page_table.insert(page_id, frame_id);
    }

    /// Write an unpinned victim back if dirty. Called under the pool latch;
    /// nobody holds the data latch of an unpinned frame.
    fn write_back(&self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &self.frames[frame_id.0];
        if !frame.is_dirty() {
            return Ok(());
        }

        {
            let page = frame.page();
            self.disk.lock().write_page(page_id, &page)?;
        }
        frame.clear_dirty();

        BufferPoolStats::bump(&self.stats.pages_written);
        trace!(%page_id, %frame_id, "wrote victim to disk");
        Ok(())
    }

    /// Check that the page table, free list, frames and replacer agree.
    #[cfg(test)]
    fn assert_consistent(&self) {
        let state = self.state.lock();

        let mut free = vec![false; self.frames.len()];
        for &frame_id in &state.free_list {
            assert!(!free[frame_id.0], "{frame_id} on free list twice");
            free[frame_id.0] = true;
        }

        for (&page_id, &frame_id) in &state.page_table {
            assert!(!free[frame_id.0], "{frame_id} resident and free");
            assert_eq!(self.frames[frame_id.0].page_id(), page_id);
        }

        let mut evictable = 0;
        for (i, frame) in self.frames.iter().enumerate() {
            let frame_id = FrameId::new(i);
            let resident = state.page_table.get(&frame.page_id()) == Some(&frame_id);
            assert_eq!(resident, !free[i], "{frame_id} neither resident nor free");
            if free[i] {
                assert!(frame.is_empty());
                assert_eq!(frame.pin_count(), 0);
            }

            let should_be_evictable = resident && frame.pin_count() == 0;
            assert_eq!(state.replacer.is_evictable(frame_id), should_be_evictable);
            evictable += usize::from(should_be_evictable);
        }
        assert_eq!(state.replacer.size(), evictable);
    }
}
