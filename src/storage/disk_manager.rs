//! Disk collaborators - durable paged storage behind the buffer pool.
//!
//! The [`DiskManager`] trait is the only view the buffer pool has of
//! storage: allocate, deallocate, read and write one page at a time by id.
//! [`FileDiskManager`] stores pages in a single file.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;

/// Synchronous page storage consumed by the buffer pool.
///
/// The buffer pool serializes every call behind its own disk latch, so
/// implementations only need `&mut self` access and never see concurrent
/// calls.
pub trait DiskManager: Send {
    /// Return a fresh page id, unique for the life of the store.
    fn allocate_page(&mut self) -> Result<PageId>;

    /// Mark a page id as no longer used.
    fn deallocate_page(&mut self, page_id: PageId) -> Result<()>;

    /// Fill `page` with the persisted bytes of `page_id`.
    fn read_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()>;

    /// Persist `page` as the content of `page_id`.
    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()>;
}

impl<D: DiskManager + ?Sized> DiskManager for Box<D> {
    fn allocate_page(&mut self) -> Result<PageId> {
        (**self).allocate_page()
    }

    fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        (**self).deallocate_page(page_id)
    }

    fn read_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()> {
        (**self).read_page(page_id, page)
    }

    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        (**self).write_page(page_id, page)
    }
}

/// Stores pages in a single database file.
///
/// # File Layout
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 0  │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (4KB)   │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    N×4096
/// ```
///
/// Page ids are handed out by extending the file and are never reused.
/// Deallocated ids are remembered only for the lifetime of this handle;
/// reads and writes against them fail with [`Error::PageNotFound`].
///
/// # Durability
/// Every write and allocation is followed by `sync_all()`.
pub struct FileDiskManager {
    file: File,
    /// Number of pages in the file.
    page_count: u32,
    deallocated: HashSet<PageId>,
}

impl FileDiskManager {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            page_count: 0,
            deallocated: HashSet::new(),
        })
    }

    /// Open an existing database file.
    ///
    /// A trailing partial page (from a torn allocation) is ignored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let page_count = page_count_for(file.metadata()?.len())?;

        Ok(Self {
            file,
            page_count,
            deallocated: HashSet::new(),
        })
    }

    /// Open an existing database file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Total size of the database file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        u64::from(self.page_count) * PAGE_SIZE as u64
    }

    fn check_live(&self, page_id: PageId) -> Result<()> {
        if page_id.0 >= self.page_count || self.deallocated.contains(&page_id) {
            return Err(Error::PageNotFound(page_id));
        }
        Ok(())
    }
}

impl DiskManager for FileDiskManager {
    fn allocate_page(&mut self) -> Result<PageId> {
        let page_id = PageId::new(self.page_count);
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id));
        }

        self.file
            .seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        self.file.write_all(&[0u8; PAGE_SIZE])?;
        self.file.sync_all()?;

        self.page_count += 1;
        Ok(page_id)
    }

    fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        self.check_live(page_id)?;
        self.deallocated.insert(page_id);
        Ok(())
    }

    fn read_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()> {
        self.check_live(page_id)?;

        self.file
            .seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        self.file.read_exact(page.as_mut_slice())?;
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        self.check_live(page_id)?;

        self.file
            .seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        self.file.write_all(page.as_slice())?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Number of whole pages in a file of `file_size` bytes.
///
/// Fails if the file holds more pages than a `PageId` can address.
fn page_count_for(file_size: u64) -> Result<u32> {
    let pages = file_size / PAGE_SIZE as u64;
    u32::try_from(pages)
        .ok()
        .filter(|&n| n != PageId::INVALID.0)
        .ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("database file holds {pages} pages, more than a page id can address"),
            ))
        })
}
