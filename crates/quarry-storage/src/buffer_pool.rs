use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use quarry_common::QuarryResult;

use crate::disk_manager::DiskManager;
use crate::lru_replacer::{LruReplacer, Replacer};
use crate::page::Page;
use crate::page_id::{FrameId, PageId};

/// The buffer pool API the rest of the engine programs against.
///
/// Expected outcomes use `Option`/`bool`: `Ok(None)` means no evictable
/// frame was available, `false` means the page was not resident or the pin
/// discipline was violated. `Err` is reserved for disk manager failures.
pub trait BufferPool: Send + Sync {
    /// Allocate a fresh page id and return it with a zeroed frame, pinned
    /// once. `Ok(None)` if every frame is pinned.
    fn new_page(&self) -> QuarryResult<Option<(PageId, &Page)>>;

    /// Return the frame holding `page_id`, reading it from disk if it is
    /// not resident. Increments the pin count. `Ok(None)` if the page is
    /// not resident and every frame is pinned.
    fn fetch_page(&self, page_id: PageId) -> QuarryResult<Option<&Page>>;

    /// Release one pin on `page_id`, ORing `is_dirty` into the frame's
    /// dirty flag. Returns false if the page is not resident or its pin
    /// count is already zero.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool;

    /// Write `page_id`'s frame to disk and clear its dirty flag. Does not
    /// evict. Returns `Ok(false)` on an invalid id or non-resident page.
    fn flush_page(&self, page_id: PageId) -> QuarryResult<bool>;

    /// Flush every resident page, dirty or not.
    fn flush_all_pages(&self) -> QuarryResult<()>;

    /// Drop `page_id` from the pool, discarding its contents. Returns true
    /// if the page was not resident, false if it is still pinned.
    fn delete_page(&self, page_id: PageId) -> bool;

    /// Total frame capacity.
    fn pool_size(&self) -> usize;
}

/// One buffer pool instance: a fixed set of frames, a page table, a free
/// list, and an LRU replacer.
///
/// All bookkeeping lives under a single mutex; per-frame metadata is atomic
/// so returned `&Page` references remain readable without it. Disk I/O for
/// eviction and fetch happens while the mutex is held, which keeps the
/// page-table and frame state trivially consistent.
pub struct BufferPoolManagerInstance {
    frames: Vec<Page>,
    inner: Mutex<PoolInner>,
    replacer: LruReplacer,
    disk: Arc<dyn DiskManager>,
    num_instances: usize,
    instance_index: usize,
}

struct PoolInner {
    /// Maps resident page ids to their frames. An entry exists iff the page
    /// is resident and the frame is off the free list.
    page_table: HashMap<PageId, FrameId>,
    /// Frames never used or returned by `delete_page`, preferred over
    /// eviction so cold frames are filled before anything is re-read.
    free_list: VecDeque<FrameId>,
    next_page_id: i32,
}

impl BufferPoolManagerInstance {
    /// Create a standalone instance owning the whole page-id space.
    pub fn new(pool_size: usize, disk: Arc<dyn DiskManager>) -> Self {
        Self::new_sharded(pool_size, 1, 0, disk)
    }

    /// Create one shard of a parallel pool. Ids allocated here satisfy
    /// `id mod num_instances == instance_index`.
    pub fn new_sharded(
        pool_size: usize,
        num_instances: usize,
        instance_index: usize,
        disk: Arc<dyn DiskManager>,
    ) -> Self {
        assert!(num_instances > 0, "a pool needs at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index {instance_index} out of range for {num_instances} instances"
        );
        let frames: Vec<Page> = (0..pool_size).map(|_| Page::new()).collect();
        let free_list = (0..pool_size as u32).map(FrameId).collect();
        Self {
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
                next_page_id: instance_index as i32,
            }),
            replacer: LruReplacer::new(pool_size),
            disk,
            num_instances,
            instance_index,
        }
    }

    fn frame(&self, frame_id: FrameId) -> &Page {
        &self.frames[frame_id.0 as usize]
    }

    /// Number of resident pages. Exposed for shard-routing introspection.
    pub fn resident_count(&self) -> usize {
        self.inner.lock().unwrap().page_table.len()
    }

    /// Whether `page_id` currently occupies a frame.
    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.inner.lock().unwrap().page_table.contains_key(&page_id)
    }

    /// Take a frame for reuse: free list first, then an LRU victim. A dirty
    /// victim is written back before its frame is handed out.
    fn obtain_frame(&self, inner: &mut PoolInner) -> QuarryResult<Option<FrameId>> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(Some(frame_id));
        }
        let Some(frame_id) = self.replacer.victim() else {
            return Ok(None);
        };
        let frame = self.frame(frame_id);
        let old_page_id = frame.page_id();
        if frame.is_dirty() {
            tracing::debug!(page_id = %old_page_id, "writing back dirty page on eviction");
            // SAFETY: the victim is unpinned, so no holder exists, and the
            // pool mutex keeps the frame from being handed out twice.
            self.disk.write_page(old_page_id, unsafe { frame.data() })?;
            frame.set_dirty(false);
        }
        inner.page_table.remove(&old_page_id);
        Ok(Some(frame_id))
    }

    fn allocate_page(&self, inner: &mut PoolInner) -> PageId {
        let page_id = PageId(inner.next_page_id);
        inner.next_page_id += self.num_instances as i32;
        debug_assert_eq!(
            page_id.0 as usize % self.num_instances,
            self.instance_index,
            "allocated page id violates shard striping"
        );
        page_id
    }

    /// Return an id to the allocation domain. The striped allocator does
    /// not reuse ids, so this only exists to mark the lifecycle point.
    fn deallocate_page(&self, _page_id: PageId) {}

    fn flush_frame(&self, page_id: PageId, frame: &Page) -> QuarryResult<()> {
        // SAFETY: the pool mutex is held. A concurrent holder may exist,
        // but flushing a page someone is actively mutating is a caller
        // discipline violation; the bytes themselves stay valid.
        self.disk.write_page(page_id, unsafe { frame.data() })?;
        frame.set_dirty(false);
        Ok(())
    }
}

impl BufferPool for BufferPoolManagerInstance {
    fn new_page(&self) -> QuarryResult<Option<(PageId, &Page)>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(frame_id) = self.obtain_frame(&mut inner)? else {
            return Ok(None);
        };
        let page_id = self.allocate_page(&mut inner);

        let frame = self.frame(frame_id);
        // SAFETY: the frame is not in the page table and unpinned; the pool
        // mutex makes us its only accessor.
        let data = unsafe { frame.data_mut() };
        data.fill(0);
        frame.set_page_id(page_id);
        frame.set_pin_count(1);
        frame.set_dirty(false);

        inner.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        Ok(Some((page_id, frame)))
    }

    fn fetch_page(&self, page_id: PageId) -> QuarryResult<Option<&Page>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = self.frame(frame_id);
            frame.pin();
            self.replacer.pin(frame_id);
            return Ok(Some(frame));
        }

        let Some(frame_id) = self.obtain_frame(&mut inner)? else {
            return Ok(None);
        };
        let frame = self.frame(frame_id);
        // SAFETY: as in `new_page`, the frame is unreachable by others.
        self.disk.read_page(page_id, unsafe { frame.data_mut() })?;
        frame.set_page_id(page_id);
        frame.set_pin_count(1);
        frame.set_dirty(false);

        inner.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        Ok(Some(frame))
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock().unwrap();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = self.frame(frame_id);
        if frame.pin_count() == 0 {
            return false;
        }
        if is_dirty {
            // Monotonic: a clean unpin never clears a previous dirty mark.
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    fn flush_page(&self, page_id: PageId) -> QuarryResult<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }
        let inner = self.inner.lock().unwrap();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };
        self.flush_frame(page_id, self.frame(frame_id))?;
        Ok(true)
    }

    fn flush_all_pages(&self) -> QuarryResult<()> {
        let inner = self.inner.lock().unwrap();
        for (&page_id, &frame_id) in inner.page_table.iter() {
            self.flush_frame(page_id, self.frame(frame_id))?;
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return true;
        };
        let frame = self.frame(frame_id);
        if frame.pin_count() > 0 {
            return false;
        }

        // The frame was unpinned, so it sits in the replacer; a free-list
        // frame must never also be an eviction candidate.
        inner.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        frame.reset();
        // SAFETY: unpinned and no longer in the page table; contents are
        // being discarded, not written back.
        let data = unsafe { frame.data_mut() };
        data.fill(0);
        inner.free_list.push_back(frame_id);
        self.deallocate_page(page_id);
        true
    }

    fn pool_size(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_manager::MemoryDiskManager;
    use crate::page_id::PAGE_SIZE;

    fn make_pool(pool_size: usize) -> (BufferPoolManagerInstance, Arc<MemoryDiskManager>) {
        let disk = Arc::new(MemoryDiskManager::new());
        let pool = BufferPoolManagerInstance::new(pool_size, disk.clone());
        (pool, disk)
    }

    #[test]
    fn new_page_allocates_sequential_ids() {
        let (pool, _disk) = make_pool(10);
        for expected in 0..10 {
            let (page_id, page) = pool.new_page().unwrap().unwrap();
            assert_eq!(page_id, PageId(expected));
            assert_eq!(page.pin_count(), 1);
            assert!(page.read().iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn new_page_fails_when_all_pinned() {
        let (pool, disk) = make_pool(10);
        for _ in 0..10 {
            pool.new_page().unwrap().unwrap();
        }
        assert!(pool.new_page().unwrap().is_none());

        // Unpinning one page frees a victim; its bytes reach the disk.
        {
            let page = pool.fetch_page(PageId(0)).unwrap().unwrap();
            page.write()[0] = 0xCC;
            assert!(pool.unpin_page(PageId(0), true));
        }
        assert!(pool.unpin_page(PageId(0), true));

        let (page_id, _page) = pool.new_page().unwrap().unwrap();
        assert_eq!(page_id, PageId(10));
        assert_eq!(disk.page(PageId(0)).unwrap()[0], 0xCC);
    }

    #[test]
    fn fetch_resident_page_reuses_frame() {
        let (pool, disk) = make_pool(3);
        let (page_id, page) = pool.new_page().unwrap().unwrap();
        page.write()[0] = 0x5A;
        assert!(pool.unpin_page(page_id, false));

        let page = pool.fetch_page(page_id).unwrap().unwrap();
        assert_eq!(page.pin_count(), 1);
        // Contents survive without a disk round trip: nothing was flushed,
        // so a re-read would have produced zeros.
        assert_eq!(page.read()[0], 0x5A);
        assert_eq!(disk.page_count(), 0);
        assert!(pool.unpin_page(page_id, false));
    }

    #[test]
    fn fetch_evicted_page_reads_from_disk() {
        let (pool, _disk) = make_pool(1);
        let (first, page) = pool.new_page().unwrap().unwrap();
        page.write()[7] = 0x77;
        assert!(pool.unpin_page(first, true));

        // Evict `first` by allocating into the only frame.
        let (second, _page) = pool.new_page().unwrap().unwrap();
        assert!(pool.unpin_page(second, false));
        assert!(!pool.is_resident(first));

        let page = pool.fetch_page(first).unwrap().unwrap();
        assert_eq!(page.read()[7], 0x77);
        assert!(pool.unpin_page(first, false));
    }

    #[test]
    fn unpin_not_resident_fails() {
        let (pool, _disk) = make_pool(2);
        assert!(!pool.unpin_page(PageId(99), false));
    }

    #[test]
    fn unpin_below_zero_fails() {
        let (pool, _disk) = make_pool(2);
        let (page_id, _page) = pool.new_page().unwrap().unwrap();
        assert!(pool.unpin_page(page_id, true));
        assert!(!pool.unpin_page(page_id, true));
    }

    #[test]
    fn dirty_flag_is_monotonic() {
        let (pool, disk) = make_pool(1);
        let (page_id, page) = pool.new_page().unwrap().unwrap();
        page.write()[0] = 0xEE;
        assert!(pool.unpin_page(page_id, true));

        // A later clean unpin must not erase the dirty mark.
        pool.fetch_page(page_id).unwrap().unwrap();
        assert!(pool.unpin_page(page_id, false));

        // Eviction must still write the page back.
        let (second, _page) = pool.new_page().unwrap().unwrap();
        assert!(pool.unpin_page(second, false));
        assert_eq!(disk.page(page_id).unwrap()[0], 0xEE);
    }

    #[test]
    fn flush_writes_and_clears_dirty() {
        let (pool, disk) = make_pool(2);
        let (page_id, page) = pool.new_page().unwrap().unwrap();
        page.write()[0] = 0xAB;
        assert!(pool.unpin_page(page_id, true));

        assert!(pool.flush_page(page_id).unwrap());
        assert_eq!(disk.page(page_id).unwrap()[0], 0xAB);

        let page = pool.fetch_page(page_id).unwrap().unwrap();
        assert!(!page.is_dirty());
        assert!(pool.unpin_page(page_id, false));

        assert!(!pool.flush_page(PageId(99)).unwrap());
        assert!(!pool.flush_page(PageId::INVALID).unwrap());
    }

    #[test]
    fn flush_all_covers_clean_pages() {
        let (pool, disk) = make_pool(4);
        for _ in 0..3 {
            let (page_id, _page) = pool.new_page().unwrap().unwrap();
            assert!(pool.unpin_page(page_id, false));
        }
        pool.flush_all_pages().unwrap();
        assert_eq!(disk.page_count(), 3);
        assert_eq!(disk.page(PageId(1)).unwrap(), vec![0u8; PAGE_SIZE]);
    }

    #[test]
    fn delete_pinned_page_fails() {
        let (pool, _disk) = make_pool(2);
        let (page_id, _page) = pool.new_page().unwrap().unwrap();
        assert!(!pool.delete_page(page_id));
        assert!(pool.unpin_page(page_id, false));
        assert!(pool.delete_page(page_id));
        assert!(!pool.is_resident(page_id));
    }

    #[test]
    fn delete_not_resident_succeeds() {
        let (pool, _disk) = make_pool(2);
        assert!(pool.delete_page(PageId(42)));
    }

    #[test]
    fn delete_discards_dirty_contents() {
        let (pool, disk) = make_pool(2);
        let (page_id, page) = pool.new_page().unwrap().unwrap();
        page.write()[0] = 0xBD;
        assert!(pool.unpin_page(page_id, true));
        assert!(pool.delete_page(page_id));
        // Deleted contents are dropped, never written back.
        assert!(disk.page(page_id).is_none());
    }

    #[test]
    fn deleted_frame_returns_through_free_list() {
        let (pool, _disk) = make_pool(1);
        let (first, _page) = pool.new_page().unwrap().unwrap();
        assert!(pool.unpin_page(first, false));
        assert!(pool.delete_page(first));

        // The freed frame must be reusable without an eviction.
        let (second, page) = pool.new_page().unwrap().unwrap();
        assert_eq!(second, PageId(1));
        assert!(page.read().iter().all(|&b| b == 0));
    }

    #[test]
    fn free_list_preferred_over_eviction() {
        let (pool, _disk) = make_pool(2);
        let (first, _page) = pool.new_page().unwrap().unwrap();
        assert!(pool.unpin_page(first, false));

        // Second frame comes off the free list; the first page stays put.
        let (second, _page) = pool.new_page().unwrap().unwrap();
        assert!(pool.unpin_page(second, false));
        assert!(pool.is_resident(first));
        assert!(pool.is_resident(second));
        assert_eq!(pool.resident_count(), 2);
    }

    #[test]
    fn sharded_allocation_is_striped() {
        let disk = Arc::new(MemoryDiskManager::new());
        let pool = BufferPoolManagerInstance::new_sharded(8, 4, 2, disk);
        for expected in [2, 6, 10] {
            let (page_id, _page) = pool.new_page().unwrap().unwrap();
            assert_eq!(page_id, PageId(expected));
            assert!(pool.unpin_page(page_id, false));
        }
    }
}
