//! Integration tests for the buffer pool manager.
//!
//! File-backed persistence, concurrent callers, and disk failures injected
//! through a custom `DiskManager`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use clockpool::{
    BufferPoolManager, DiskManager, Error, FileDiskManager, MemoryDiskManager, Page, PageId,
    Result,
};
use parking_lot::Mutex;
use tempfile::tempdir;

fn create_file_bpm(pool_size: usize) -> (BufferPoolManager, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let dm = FileDiskManager::create(dir.path().join("test.db")).unwrap();
    (BufferPoolManager::new(pool_size, dm), dir)
}

/// Data survives repeated eviction through a real file.
#[test]
fn test_data_persistence_across_evictions() {
    let (bpm, _dir) = create_file_bpm(2);

    let mut page_ids = vec![];
    for i in 0u8..5 {
        let mut guard = bpm.new_page_write().unwrap();
        guard.as_mut_slice()[0] = i;
        guard.as_mut_slice()[1] = i.wrapping_mul(3);
        page_ids.push(guard.page_id());
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.as_slice()[0], i as u8);
        assert_eq!(guard.as_slice()[1], (i as u8).wrapping_mul(3));
    }
}

/// Flush, drop the pool, reopen the file with a fresh pool.
#[test]
fn test_flush_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let data = b"persistent!";

    let pid = {
        let bpm = BufferPoolManager::new(10, FileDiskManager::create(&path).unwrap());

        let mut guard = bpm.new_page_write().unwrap();
        let pid = guard.page_id();
        guard.as_mut_slice()[..data.len()].copy_from_slice(data);
        drop(guard);

        let summary = bpm.flush_all_pages();
        assert!(summary.is_complete());
        assert_eq!(summary.written, 1);
        pid
    };

    let bpm = BufferPoolManager::new(10, FileDiskManager::open(&path).unwrap());
    let guard = bpm.fetch_page_read(pid).unwrap();
    assert_eq!(&guard.as_slice()[..data.len()], data);
}

/// Deleting a page deallocates it in the file manager.
#[test]
fn test_delete_then_fetch_fails() {
    let (bpm, _dir) = create_file_bpm(4);
    let pid = bpm.new_page_write().unwrap().page_id();

    assert!(bpm.delete_page(pid));
    assert!(matches!(bpm.fetch_page(pid), Err(Error::PageNotFound(_))));
}

#[test]
fn test_concurrent_writers() {
    let (bpm, _dir) = create_file_bpm(10);
    let bpm = Arc::new(bpm);

    let page_ids: Vec<PageId> = (0..5)
        .map(|_| bpm.new_page_write().unwrap().page_id())
        .collect();

    let handles: Vec<_> = page_ids
        .iter()
        .enumerate()
        .map(|(i, &pid)| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                for j in 0..50 {
                    let mut guard = bpm.fetch_page_write(pid).unwrap();
                    guard.as_mut_slice()[0] = ((i * 50 + j) % 256) as u8;
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.as_slice()[0], ((i * 50 + 49) % 256) as u8);
    }
}

/// Many threads churn a small pool with the explicit API; every page keeps
/// the counter its owner last wrote, and no pins leak.
#[test]
fn test_concurrent_churn_under_eviction() {
    const THREADS: usize = 4;
    const PAGES_PER_THREAD: usize = 6;
    const ROUNDS: u8 = 20;

    let disk = MemoryDiskManager::new();
    let bpm = Arc::new(BufferPoolManager::new(THREADS + 2, disk));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                let mut mine = Vec::new();
                for _ in 0..PAGES_PER_THREAD {
                    let h = loop {
                        match bpm.new_page() {
                            Ok(h) => break h,
                            Err(Error::PoolExhausted) => thread::yield_now(),
                            Err(e) => panic!("new_page failed: {e}"),
                        }
                    };
                    mine.push(h.page_id());
                    assert!(bpm.unpin_page(h.page_id(), true));
                }

                for round in 1..=ROUNDS {
                    for &pid in &mine {
                        let h = loop {
                            match bpm.fetch_page(pid) {
                                Ok(h) => break h,
                                Err(Error::PoolExhausted) => thread::yield_now(),
                                Err(e) => panic!("fetch failed: {e}"),
                            }
                        };
                        h.write().as_mut_slice()[0] = round;
                        assert!(bpm.unpin_page(pid, true));
                    }
                }
                mine
            })
        })
        .collect();

    let all: Vec<PageId> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(bpm.evictable_count(), bpm.page_count());
    for pid in all {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.as_slice()[0], ROUNDS);
    }
}

/// A thread holding a write guard on P fetches Q while another thread flushes
/// P. Both must finish: the flusher may not sit on the pool latch while it
/// waits for P's data latch.
#[test]
fn test_flush_while_guard_holder_fetches_another_page() {
    let disk = MemoryDiskManager::new();
    let bpm = Arc::new(BufferPoolManager::new(4, disk.clone()));

    let p = {
        let mut guard = bpm.new_page_write().unwrap();
        guard.as_mut_slice()[0] = 0x11;
        guard.page_id()
    };
    let q = bpm.new_page_write().unwrap().page_id();
    assert_eq!(bpm.is_dirty(p), Some(true));

    let barrier = Arc::new(Barrier::new(2));
    let (done_tx, done_rx) = mpsc::channel();

    let holder = {
        let (bpm, barrier, done_tx) = (Arc::clone(&bpm), Arc::clone(&barrier), done_tx.clone());
        thread::spawn(move || {
            let mut guard = bpm.fetch_page_write(p).unwrap();
            guard.as_mut_slice()[0] = 0x5A;
            barrier.wait();

            thread::sleep(Duration::from_millis(100));
            let other = bpm.fetch_page_read(q).unwrap();
            assert_eq!(other.page_id(), q);
            drop(other);
            drop(guard);
            done_tx.send("holder").unwrap();
        })
    };

    let flusher = {
        let bpm = Arc::clone(&bpm);
        thread::spawn(move || {
            barrier.wait();
            assert!(bpm.flush_page(p).unwrap());
            done_tx.send("flusher").unwrap();
        })
    };

    let mut finished = Vec::new();
    for _ in 0..2 {
        match done_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(name) => finished.push(name),
            Err(_) => panic!("threads stuck, finished so far: {finished:?}"),
        }
    }
    holder.join().unwrap();
    flusher.join().unwrap();

    // The flush waited for the writer, so it wrote the writer's bytes.
    assert_eq!(disk.page_bytes(p).unwrap()[0], 0x5A);
    assert_eq!(bpm.pin_count(p), Some(0));
    assert_eq!(bpm.evictable_count(), 2);
}

#[test]
fn test_stats_accuracy() {
    let (bpm, _dir) = create_file_bpm(2);

    let pid = bpm.new_page_write().unwrap().page_id();
    for _ in 0..5 {
        drop(bpm.fetch_page_read(pid).unwrap());
    }
    assert_eq!(bpm.stats().snapshot().cache_hits, 5);

    drop(bpm.new_page_write().unwrap());
    drop(bpm.new_page_write().unwrap());

    let stats = bpm.stats().snapshot();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.pages_allocated, 3);
    assert!(stats.pages_written >= 1);
}

// ============================================================================
// Failure injection
// ============================================================================

/// Memory-backed disk whose writes or reads can be switched to fail, either
/// for every page or for a single one.
#[derive(Clone, Default)]
struct FlakyDisk {
    inner: MemoryDiskManager,
    fail_writes: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
    fail_page: Arc<Mutex<Option<PageId>>>,
}

fn injected() -> Error {
    Error::Io(std::io::Error::other("injected"))
}

impl DiskManager for FlakyDisk {
    fn allocate_page(&mut self) -> Result<PageId> {
        self.inner.allocate_page()
    }

    fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        self.inner.deallocate_page(page_id)
    }

    fn read_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.read_page(page_id, page)
    }

    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) || *self.fail_page.lock() == Some(page_id) {
            return Err(injected());
        }
        self.inner.write_page(page_id, page)
    }
}

#[test]
fn test_failed_write_back_keeps_victim() {
    let disk = FlakyDisk::default();
    let bpm = BufferPoolManager::new(1, disk.clone());

    let h = bpm.new_page().unwrap();
    let pid = h.page_id();
    h.write().as_mut_slice()[0] = 0x77;
    bpm.unpin_page(pid, true);

    disk.fail_writes.store(true, Ordering::SeqCst);
    assert!(matches!(bpm.new_page(), Err(Error::Io(_))));

    // Still resident, dirty and evictable; no page id was consumed.
    assert_eq!(bpm.pin_count(pid), Some(0));
    assert_eq!(bpm.is_dirty(pid), Some(true));
    assert_eq!(bpm.evictable_count(), 1);
    assert_eq!(disk.inner.allocated_count(), 1);

    disk.fail_writes.store(false, Ordering::SeqCst);
    let next = bpm.new_page().unwrap();
    assert_ne!(next.page_id(), pid);
    assert_eq!(disk.inner.page_bytes(pid).unwrap()[0], 0x77);
}

#[test]
fn test_failed_read_leaves_pool_consistent() {
    let disk = FlakyDisk::default();
    let bpm = BufferPoolManager::new(2, disk.clone());

    let pid = bpm.new_page().unwrap().page_id();
    bpm.unpin_page(pid, false);
    assert!(bpm.delete_page(pid));
    let other = {
        let mut d = disk.clone();
        d.allocate_page().unwrap()
    };

    disk.fail_reads.store(true, Ordering::SeqCst);
    assert!(bpm.fetch_page(other).is_err());
    assert_eq!(bpm.free_frame_count(), 2);
    assert_eq!(bpm.page_count(), 0);

    disk.fail_reads.store(false, Ordering::SeqCst);
    assert!(bpm.fetch_page(other).is_ok());
}

#[test]
fn test_flush_all_continues_past_failures() {
    let disk = FlakyDisk::default();
    let bpm = BufferPoolManager::new(4, disk.clone());

    let pids: Vec<PageId> = (0..3)
        .map(|i| {
            let h = bpm.new_page().unwrap();
            h.write().as_mut_slice()[0] = i;
            bpm.unpin_page(h.page_id(), true);
            h.page_id()
        })
        .collect();

    let bad = pids[1];
    *disk.fail_page.lock() = Some(bad);
    let summary = bpm.flush_all_pages();
    assert!(!summary.is_complete());
    assert_eq!(summary.written, 2);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, bad);
    assert!(matches!(summary.failed[0].1, Error::Io(_)));

    // The failing page stays dirty; the others reached disk and are clean.
    assert_eq!(bpm.is_dirty(bad), Some(true));
    assert_eq!(disk.inner.page_bytes(bad).unwrap()[0], 0);
    for (i, &pid) in pids.iter().enumerate().filter(|&(_, &pid)| pid != bad) {
        assert_eq!(bpm.is_dirty(pid), Some(false));
        assert_eq!(disk.inner.page_bytes(pid).unwrap()[0], i as u8);
    }

    *disk.fail_page.lock() = None;
    let summary = bpm.flush_all_pages();
    assert!(summary.is_complete());
    assert_eq!(summary.written, 1);
    assert_eq!(disk.inner.page_bytes(bad).unwrap()[0], 1);
}

#[test]
fn test_flush_page_error_keeps_dirty() {
    let disk = FlakyDisk::default();
    let bpm = BufferPoolManager::new(2, disk.clone());

    let pid = bpm.new_page().unwrap().page_id();
    bpm.unpin_page(pid, true);

    disk.fail_writes.store(true, Ordering::SeqCst);
    assert!(bpm.flush_page(pid).is_err());
    assert_eq!(bpm.is_dirty(pid), Some(true));
}
