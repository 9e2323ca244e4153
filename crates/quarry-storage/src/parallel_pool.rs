use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quarry_common::QuarryResult;

use crate::buffer_pool::{BufferPool, BufferPoolManagerInstance};
use crate::disk_manager::DiskManager;
use crate::page::Page;
use crate::page_id::PageId;

/// Shards the page-id space across independent buffer pool instances.
///
/// Instance `i` owns every page id with `id mod num_instances == i`, so
/// operations on unrelated pages never contend on the same mutex. New pages
/// are allocated round-robin, spreading pressure across shards.
pub struct ParallelBufferPoolManager {
    managers: Vec<BufferPoolManagerInstance>,
    /// Shard to try first on the next `new_page`; advances after every call.
    starting_index: AtomicUsize,
}

impl ParallelBufferPoolManager {
    pub fn new(num_instances: usize, pool_size: usize, disk: Arc<dyn DiskManager>) -> Self {
        assert!(num_instances > 0, "a pool needs at least one instance");
        let managers = (0..num_instances)
            .map(|i| {
                BufferPoolManagerInstance::new_sharded(pool_size, num_instances, i, disk.clone())
            })
            .collect();
        Self {
            managers,
            starting_index: AtomicUsize::new(0),
        }
    }

    pub fn num_instances(&self) -> usize {
        self.managers.len()
    }

    /// The instance responsible for `page_id`.
    fn manager_for(&self, page_id: PageId) -> &BufferPoolManagerInstance {
        let idx = page_id.0.rem_euclid(self.managers.len() as i32) as usize;
        &self.managers[idx]
    }

    /// Direct access to one shard. Exposed for routing introspection.
    pub fn instance(&self, idx: usize) -> &BufferPoolManagerInstance {
        &self.managers[idx]
    }
}

impl BufferPool for ParallelBufferPoolManager {
    fn new_page(&self) -> QuarryResult<Option<(PageId, &Page)>> {
        let start = self.starting_index.load(Ordering::Relaxed);
        let n = self.managers.len();
        for trial in 0..n {
            let idx = (start + trial) % n;
            if let Some(result) = self.managers[idx].new_page()? {
                // Rotate past the shard that satisfied us so consecutive
                // allocations land on different instances.
                self.starting_index.store((idx + 1) % n, Ordering::Relaxed);
                return Ok(Some(result));
            }
        }
        self.starting_index.store((start + 1) % n, Ordering::Relaxed);
        Ok(None)
    }

    fn fetch_page(&self, page_id: PageId) -> QuarryResult<Option<&Page>> {
        self.manager_for(page_id).fetch_page(page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.manager_for(page_id).unpin_page(page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> QuarryResult<bool> {
        self.manager_for(page_id).flush_page(page_id)
    }

    fn flush_all_pages(&self) -> QuarryResult<()> {
        for manager in &self.managers {
            manager.flush_all_pages()?;
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> bool {
        self.manager_for(page_id).delete_page(page_id)
    }

    fn pool_size(&self) -> usize {
        self.managers.iter().map(|m| m.pool_size()).sum()
    }
}
