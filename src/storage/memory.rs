//! In-memory page storage.
//!
//! [`MemoryDiskManager`] keeps pages in a `Vec` slot per page id. Clones share
//! the same storage, so a test can hand one clone to the buffer pool and keep
//! another to inspect what actually reached "disk".

use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{Error, PageId, Result};
use crate::storage::disk_manager::DiskManager;
use crate::storage::page::Page;

/// Counters of collaborator calls that succeeded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiskCounters {
    pub reads: u64,
    pub writes: u64,
    pub allocations: u64,
    pub deallocations: u64,
}

#[derive(Default)]
struct MemoryStore {
    /// Slot per allocated id; `None` once deallocated.
    pages: Vec<Option<Box<Page>>>,
    counters: DiskCounters,
}

impl MemoryStore {
    fn slot(&mut self, page_id: PageId) -> Result<&mut Page> {
        self.pages
            .get_mut(page_id.0 as usize)
            .and_then(|slot| slot.as_deref_mut())
            .ok_or(Error::PageNotFound(page_id))
    }
}

/// Page storage held entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryDiskManager {
    store: Arc<Mutex<MemoryStore>>,
}

impl MemoryDiskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids handed out so far, including deallocated ones.
    pub fn allocated_count(&self) -> usize {
        self.store.lock().pages.len()
    }

    /// Whether `page_id` was allocated and not yet deallocated.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.store
            .lock()
            .pages
            .get(page_id.0 as usize)
            .is_some_and(Option::is_some)
    }

    /// Copy of the persisted bytes of a page.
    pub fn page_bytes(&self, page_id: PageId) -> Option<Vec<u8>> {
        self.store.lock().slot(page_id).ok().map(|p| p.as_slice().to_vec())
    }

    pub fn counters(&self) -> DiskCounters {
        self.store.lock().counters
    }
}

impl DiskManager for MemoryDiskManager {
    fn allocate_page(&mut self) -> Result<PageId> {
        let mut store = self.store.lock();
        let page_id = u32::try_from(store.pages.len())
            .map(PageId::new)
            .map_err(|_| Error::InvalidPageId(PageId::INVALID))?;
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id));
        }

        store.pages.push(Some(Box::new(Page::new())));
        store.counters.allocations += 1;
        Ok(page_id)
    }

    fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        let mut store = self.store.lock();
        let slot = store
            .pages
            .get_mut(page_id.0 as usize)
            .filter(|slot| slot.is_some())
            .ok_or(Error::PageNotFound(page_id))?;
        *slot = None;
        store.counters.deallocations += 1;
        Ok(())
    }

    fn read_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()> {
        let mut store = self.store.lock();
        page.copy_from(store.slot(page_id)?);
        store.counters.reads += 1;
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        let mut store = self.store.lock();
        store.slot(page_id)?.copy_from(page);
        store.counters.writes += 1;
        Ok(())
    }
}
