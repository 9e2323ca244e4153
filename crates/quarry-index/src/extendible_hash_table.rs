use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use quarry_common::{QuarryResult, Transaction};
use quarry_storage::{BufferPool, Page, PageId};

use crate::bucket_page::BucketPage;
use crate::directory_page::{DirectoryPage, MAX_DEPTH};
use crate::key::{KeyComparator, KeyHasher, Storable};
use crate::pool_exhausted;

/// A disk-backed extendible hash table.
///
/// The directory and every bucket are pages owned by the buffer pool; this
/// struct holds only the directory's page id and the comparator/hasher
/// seams. Concurrency follows a two-level scheme: the `table_latch` is held
/// shared by point operations and exclusively by anything that mutates the
/// directory (split, merge), while bucket contents are protected by their
/// page's own latch underneath it.
pub struct ExtendibleHashTable<K, V, C, H> {
    bpm: Arc<dyn BufferPool>,
    directory_page_id: PageId,
    comparator: C,
    hasher: H,
    table_latch: RwLock<()>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, C, H> ExtendibleHashTable<K, V, C, H>
where
    K: Storable,
    V: Storable,
    C: KeyComparator<K>,
    H: KeyHasher<K>,
{
    /// Create a table with a fresh directory at global depth 1 pointing at
    /// two empty buckets.
    pub fn new(bpm: Arc<dyn BufferPool>, comparator: C, hasher: H) -> QuarryResult<Self> {
        let (directory_page_id, directory_page) = bpm.new_page()?.ok_or_else(pool_exhausted)?;
        let (bucket_zero_id, _) = bpm.new_page()?.ok_or_else(pool_exhausted)?;
        let (bucket_one_id, _) = bpm.new_page()?.ok_or_else(pool_exhausted)?;

        {
            let mut guard = directory_page.write();
            let mut directory = DirectoryPage::new(&mut *guard);
            directory.set_page_id(directory_page_id);
            directory.incr_global_depth();
            directory.incr_local_depth(0);
            directory.incr_local_depth(1);
            directory.set_bucket_page_id(0, bucket_zero_id);
            directory.set_bucket_page_id(1, bucket_one_id);
        }

        // New pages come zeroed, which is exactly an empty bucket.
        bpm.unpin_page(bucket_zero_id, true);
        bpm.unpin_page(bucket_one_id, true);
        bpm.unpin_page(directory_page_id, true);

        Ok(Self {
            bpm,
            directory_page_id,
            comparator,
            hasher,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    fn fetch(&self, page_id: PageId) -> QuarryResult<&Page> {
        self.bpm.fetch_page(page_id)?.ok_or_else(pool_exhausted)
    }

    /// Resolve `key` to its directory slot and bucket page under the
    /// caller's table latch. Unpins nothing; the directory page comes back
    /// pinned alongside the answer.
    fn resolve(&self, key: &K) -> QuarryResult<(&Page, usize, PageId, u32)> {
        let directory_page = self.fetch(self.directory_page_id)?;
        let guard = directory_page.read();
        let directory = DirectoryPage::new(&*guard);
        let idx = (self.hasher.hash_key(key) & directory.global_depth_mask()) as usize;
        let bucket_page_id = directory.bucket_page_id(idx);
        let local_depth = directory.local_depth(idx);
        drop(guard);
        Ok((directory_page, idx, bucket_page_id, local_depth))
    }

    /// Collect every value stored under `key`.
    pub fn get_value(&self, _txn: &Transaction, key: &K) -> QuarryResult<Vec<V>> {
        let _table = self.table_latch.read().unwrap();
        let (_directory_page, _, bucket_page_id, _) = self.resolve(key)?;
        let bucket_page = self.fetch(bucket_page_id)?;

        let mut result = Vec::new();
        {
            let guard = bucket_page.read();
            let bucket = BucketPage::<_, K, V>::new(&*guard);
            bucket.get_value(key, &self.comparator, &mut result);
        }

        self.bpm.unpin_page(bucket_page_id, false);
        self.bpm.unpin_page(self.directory_page_id, false);
        Ok(result)
    }

    /// Insert `(key, value)`. Returns `Ok(false)` if the exact pair already
    /// exists, or if the only way to make room would grow the directory
    /// past its maximum depth.
    pub fn insert(&self, txn: &Transaction, key: K, value: V) -> QuarryResult<bool> {
        {
            let _table = self.table_latch.read().unwrap();
            let (_directory_page, _, bucket_page_id, _) = self.resolve(&key)?;
            let bucket_page = self.fetch(bucket_page_id)?;

            let mut guard = bucket_page.write();
            let mut bucket = BucketPage::<_, K, V>::new(&mut *guard);
            if bucket.contains(&key, &value, &self.comparator) {
                drop(guard);
                self.bpm.unpin_page(bucket_page_id, false);
                self.bpm.unpin_page(self.directory_page_id, false);
                return Ok(false);
            }
            if !bucket.is_full() {
                let inserted = bucket.insert(&key, &value, &self.comparator);
                drop(guard);
                self.bpm.unpin_page(bucket_page_id, true);
                self.bpm.unpin_page(self.directory_page_id, false);
                return Ok(inserted);
            }
            drop(guard);
            self.bpm.unpin_page(bucket_page_id, false);
            self.bpm.unpin_page(self.directory_page_id, false);
        }
        // Full bucket: every latch is released before the split path takes
        // the table latch exclusively.
        self.split_insert(txn, key, value)
    }

    /// Split the bucket `key` routes to, then insert through the public
    /// path. The directory restructuring and the draining of the old bucket
    /// happen under the exclusive table latch; the re-inserts do not, so a
    /// rehash that overflows again can recurse into another split.
    fn split_insert(&self, txn: &Transaction, key: K, value: V) -> QuarryResult<bool> {
        let drained: Vec<(K, V)>;
        {
            let _table = self.table_latch.write().unwrap();
            let (directory_page, idx, bucket_page_id, local_depth) = self.resolve(&key)?;
            let bucket_page = self.fetch(bucket_page_id)?;

            // The world may have changed between our shared and exclusive
            // critical sections; re-check against the current bucket.
            {
                let mut guard = bucket_page.write();
                let mut bucket = BucketPage::<_, K, V>::new(&mut *guard);
                if bucket.contains(&key, &value, &self.comparator) {
                    drop(guard);
                    self.bpm.unpin_page(bucket_page_id, false);
                    self.bpm.unpin_page(self.directory_page_id, false);
                    return Ok(false);
                }
                if !bucket.is_full() {
                    let inserted = bucket.insert(&key, &value, &self.comparator);
                    drop(guard);
                    self.bpm.unpin_page(bucket_page_id, true);
                    self.bpm.unpin_page(self.directory_page_id, false);
                    return Ok(inserted);
                }
            }

            let global_depth = {
                let guard = directory_page.read();
                DirectoryPage::new(&*guard).global_depth()
            };
            if local_depth == global_depth && global_depth == MAX_DEPTH {
                tracing::debug!(
                    %bucket_page_id,
                    "insert refused: bucket full at maximum directory depth"
                );
                self.bpm.unpin_page(bucket_page_id, false);
                self.bpm.unpin_page(self.directory_page_id, false);
                return Ok(false);
            }

            let (split_page_id, _split_page) =
                self.bpm.new_page()?.ok_or_else(pool_exhausted)?;
            tracing::debug!(
                old = %bucket_page_id,
                new = %split_page_id,
                local_depth,
                global_depth,
                "splitting hash bucket"
            );

            {
                let mut guard = directory_page.write();
                let mut directory = DirectoryPage::new(&mut *guard);
                if local_depth == directory.global_depth() {
                    // Double the directory: mirror the lower half (with the
                    // triggering slot's depth already bumped), then point
                    // the new upper-half image at the fresh bucket.
                    let old_size = directory.size();
                    directory.incr_global_depth();
                    directory.incr_local_depth(idx);
                    for i in old_size..directory.size() {
                        directory.set_bucket_page_id(i, directory.bucket_page_id(i - old_size));
                        directory.set_local_depth(i, directory.local_depth(i - old_size));
                    }
                    directory.set_bucket_page_id(idx + old_size, split_page_id);
                } else {
                    // Room to spare: bump every slot aimed at the old
                    // bucket and redirect the half with the new bit set.
                    let high_bit = 1usize << local_depth;
                    for i in 0..directory.size() {
                        if directory.bucket_page_id(i) == bucket_page_id {
                            directory.incr_local_depth(i);
                            if i & high_bit != 0 {
                                directory.set_bucket_page_id(i, split_page_id);
                            }
                        }
                    }
                }
            }

            drained = {
                let mut guard = bucket_page.write();
                let mut bucket = BucketPage::<_, K, V>::new(&mut *guard);
                let mut entries =
                    Vec::with_capacity(BucketPage::<&[u8], K, V>::CAPACITY);
                for slot in 0..BucketPage::<&[u8], K, V>::CAPACITY {
                    if bucket.is_readable(slot) {
                        entries.push((bucket.key_at(slot), bucket.value_at(slot)));
                        bucket.remove_at(slot);
                    }
                }
                entries
            };

            self.bpm.unpin_page(split_page_id, true);
            self.bpm.unpin_page(bucket_page_id, true);
            self.bpm.unpin_page(self.directory_page_id, true);
        }

        for (k, v) in drained {
            self.insert(txn, k, v)?;
        }
        self.insert(txn, key, value)
    }

    /// Remove the exact `(key, value)` pair. Returns whether anything was
    /// removed; an emptied bucket triggers one coalescing attempt.
    pub fn remove(&self, txn: &Transaction, key: K, value: V) -> QuarryResult<bool> {
        let removed;
        let try_merge;
        {
            let _table = self.table_latch.read().unwrap();
            let (_directory_page, _, bucket_page_id, local_depth) = self.resolve(&key)?;
            let bucket_page = self.fetch(bucket_page_id)?;

            {
                let mut guard = bucket_page.write();
                let mut bucket = BucketPage::<_, K, V>::new(&mut *guard);
                removed = bucket.remove(&key, &value, &self.comparator);
                try_merge = bucket.is_empty() && local_depth > 0;
            }

            self.bpm.unpin_page(bucket_page_id, removed);
            self.bpm.unpin_page(self.directory_page_id, false);
        }

        if try_merge {
            self.merge(txn, &key)?;
        }
        Ok(removed)
    }

    /// Coalesce the (now empty) bucket `key` routes to into its split
    /// image. A single call performs at most one merge step; the next
    /// remove picks up any cascade.
    fn merge(&self, _txn: &Transaction, key: &K) -> QuarryResult<()> {
        let _table = self.table_latch.write().unwrap();
        let (directory_page, idx, bucket_page_id, local_depth) = self.resolve(key)?;

        if local_depth == 0 {
            self.bpm.unpin_page(self.directory_page_id, false);
            return Ok(());
        }

        let (image_page_id, image_depth) = {
            let guard = directory_page.read();
            let directory = DirectoryPage::new(&*guard);
            let image_idx = directory.split_image_index(idx);
            (
                directory.bucket_page_id(image_idx),
                directory.local_depth(image_idx),
            )
        };
        if image_depth != local_depth {
            self.bpm.unpin_page(self.directory_page_id, false);
            return Ok(());
        }

        // Someone may have refilled the bucket between our remove and this
        // exclusive section.
        let bucket_page = self.fetch(bucket_page_id)?;
        let still_empty = {
            let guard = bucket_page.read();
            BucketPage::<_, K, V>::new(&*guard).is_empty()
        };
        self.bpm.unpin_page(bucket_page_id, false);
        if !still_empty {
            self.bpm.unpin_page(self.directory_page_id, false);
            return Ok(());
        }

        tracing::debug!(
            empty = %bucket_page_id,
            into = %image_page_id,
            local_depth,
            "merging hash buckets"
        );

        {
            let mut guard = directory_page.write();
            let mut directory = DirectoryPage::new(&mut *guard);
            for i in 0..directory.size() {
                if directory.bucket_page_id(i) == bucket_page_id {
                    directory.set_bucket_page_id(i, image_page_id);
                    directory.decr_local_depth(i);
                } else if directory.bucket_page_id(i) == image_page_id {
                    directory.decr_local_depth(i);
                }
            }
            if directory.can_shrink() {
                directory.decr_global_depth();
                tracing::debug!(
                    global_depth = directory.global_depth(),
                    "directory shrunk"
                );
            }
        }

        self.bpm.unpin_page(self.directory_page_id, true);
        self.bpm.delete_page(bucket_page_id);
        Ok(())
    }

    /// Current global depth of the directory.
    pub fn get_global_depth(&self) -> QuarryResult<u32> {
        let _table = self.table_latch.read().unwrap();
        let directory_page = self.fetch(self.directory_page_id)?;
        let depth = {
            let guard = directory_page.read();
            DirectoryPage::new(&*guard).global_depth()
        };
        self.bpm.unpin_page(self.directory_page_id, false);
        Ok(depth)
    }

    /// Assert the directory invariants. Panics on violation.
    pub fn verify_integrity(&self) -> QuarryResult<()> {
        let _table = self.table_latch.read().unwrap();
        let directory_page = self.fetch(self.directory_page_id)?;
        {
            let guard = directory_page.read();
            DirectoryPage::new(&*guard).verify_integrity();
        }
        self.bpm.unpin_page(self.directory_page_id, false);
        Ok(())
    }
}
