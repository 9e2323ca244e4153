//! End-to-end buffer pool scenarios over a file-backed disk manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use quarry_storage::{
    BufferPool, BufferPoolManagerInstance, DiskManager, FileDiskManager, PageId,
    ParallelBufferPoolManager, PAGE_SIZE,
};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn with_temp_disk<F: FnOnce(Arc<FileDiskManager>)>(f: F) {
    let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("quarry_scenario_{}_{id}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    let disk = Arc::new(FileDiskManager::new(dir.join("quarry.db")).unwrap());
    f(disk);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn pin_discipline_over_a_full_pool() {
    with_temp_disk(|disk| {
        let pool = BufferPoolManagerInstance::new(10, disk.clone());

        for expected in 0..10 {
            let (page_id, page) = pool.new_page().unwrap().unwrap();
            assert_eq!(page_id, PageId(expected));
            page.write()[..8].copy_from_slice(&(expected as u64 + 1).to_le_bytes());
        }

        // Every frame is pinned; an eleventh page cannot materialize.
        assert!(pool.new_page().unwrap().is_none());

        // Releasing one dirty page opens exactly one slot.
        assert!(pool.unpin_page(PageId(0), true));
        let (page_id, _page) = pool.new_page().unwrap().unwrap();
        assert_eq!(page_id, PageId(10));

        // The evicted page's bytes landed at its offset in the file.
        let mut buf = vec![0u8; PAGE_SIZE];
        disk.read_page(PageId(0), &mut buf).unwrap();
        assert_eq!(u64::from_le_bytes(buf[..8].try_into().unwrap()), 1);

        for id in 1..11 {
            assert!(pool.unpin_page(PageId(id), id < 10));
        }
    });
}

#[test]
fn fetch_returns_resident_frame_without_rereading() {
    with_temp_disk(|disk| {
        let pool = BufferPoolManagerInstance::new(3, disk);
        let (page_id, page) = pool.new_page().unwrap().unwrap();
        assert_eq!(page_id, PageId(0));
        page.write()[0] = 0x42;
        assert!(pool.unpin_page(page_id, false));

        // The page was never flushed; a disk read would return zeros. The
        // resident frame keeps the written byte.
        let page = pool.fetch_page(page_id).unwrap().unwrap();
        assert_eq!(page.pin_count(), 1);
        assert_eq!(page.read()[0], 0x42);
        assert!(pool.unpin_page(page_id, false));
    });
}

#[test]
fn parallel_pool_routes_by_shard() {
    with_temp_disk(|disk| {
        let pool = ParallelBufferPoolManager::new(4, 5, disk);
        assert_eq!(pool.pool_size(), 20);

        // Allocate enough pages for ids 7 and 8 to exist.
        let mut allocated = vec![];
        for _ in 0..12 {
            let (page_id, _page) = pool.new_page().unwrap().unwrap();
            allocated.push(page_id);
            assert!(pool.unpin_page(page_id, false));
        }
        assert!(allocated.contains(&PageId(7)));
        assert!(allocated.contains(&PageId(8)));

        assert!(pool.fetch_page(PageId(7)).unwrap().is_some());
        assert!(pool.instance(3).is_resident(PageId(7)));
        assert!(pool.unpin_page(PageId(7), false));

        assert!(pool.fetch_page(PageId(8)).unwrap().is_some());
        assert!(pool.instance(0).is_resident(PageId(8)));
        assert!(pool.unpin_page(PageId(8), false));
    });
}

#[test]
fn flush_all_survives_reopen() {
    let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("quarry_scenario_{}_{id}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    let db_path = dir.join("quarry.db");

    {
        let disk = Arc::new(FileDiskManager::new(&db_path).unwrap());
        let pool = BufferPoolManagerInstance::new(4, disk.clone());
        for i in 0..4 {
            let (page_id, page) = pool.new_page().unwrap().unwrap();
            page.write()[0] = i as u8 + 1;
            assert!(pool.unpin_page(page_id, true));
        }
        pool.flush_all_pages().unwrap();
        disk.sync().unwrap();
    }

    // A fresh pool over the same file sees the flushed contents.
    let disk = Arc::new(FileDiskManager::new(&db_path).unwrap());
    let pool = BufferPoolManagerInstance::new(4, disk);
    for i in 0..4 {
        let page = pool.fetch_page(PageId(i)).unwrap().unwrap();
        assert_eq!(page.read()[0], i as u8 + 1);
        assert!(pool.unpin_page(PageId(i), false));
    }

    let _ = std::fs::remove_dir_all(&dir);
}
