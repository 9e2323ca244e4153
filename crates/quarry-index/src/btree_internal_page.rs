use std::marker::PhantomData;

use quarry_common::QuarryResult;
use quarry_storage::{BufferPool, PageId, PAGE_SIZE};

use crate::btree_page::{BTreePage, IndexPageType, BTREE_PAGE_HEADER_LEN};
use crate::key::{KeyComparator, Storable};
use crate::pool_exhausted;

/// Most `(key, child)` entries an internal page can hold for a key type.
pub const fn internal_page_capacity<K: Storable>() -> usize {
    (PAGE_SIZE - BTREE_PAGE_HEADER_LEN) / (K::LEN + 4)
}

/// Typed view of a B+ tree internal page.
///
/// After the shared header comes an array of `(key, child_page_id)` pairs.
/// Entry 0's key is a dummy: an internal page with `n` children stores
/// `n - 1` separator keys, and the first child covers everything below
/// `key_at(1)`.
///
/// The move/copy family reassigns children between pages, so each variant
/// takes the buffer pool and rewrites the parent pointer of every child it
/// touches, unpinning it dirty.
pub struct InternalPage<B, K> {
    buf: B,
    _marker: PhantomData<K>,
}

impl<B, K> InternalPage<B, K>
where
    B: AsRef<[u8]>,
    K: Storable,
{
    pub const CAPACITY: usize = internal_page_capacity::<K>();
    const ENTRY_LEN: usize = K::LEN + 4;

    pub fn new(buf: B) -> Self {
        assert_eq!(buf.as_ref().len(), PAGE_SIZE, "internal view needs a full page");
        Self {
            buf,
            _marker: PhantomData,
        }
    }

    fn header(&self) -> BTreePage<&[u8]> {
        BTreePage::new(self.buf.as_ref())
    }

    fn entry_offset(idx: usize) -> usize {
        debug_assert!(idx < Self::CAPACITY);
        BTREE_PAGE_HEADER_LEN + idx * Self::ENTRY_LEN
    }

    pub fn size(&self) -> usize {
        self.header().size()
    }

    pub fn max_size(&self) -> usize {
        self.header().max_size()
    }

    pub fn page_id(&self) -> PageId {
        self.header().page_id()
    }

    pub fn parent_page_id(&self) -> PageId {
        self.header().parent_page_id()
    }

    pub fn key_at(&self, idx: usize) -> K {
        let offset = Self::entry_offset(idx);
        K::read_from(&self.buf.as_ref()[offset..offset + K::LEN])
    }

    pub fn value_at(&self, idx: usize) -> PageId {
        let offset = Self::entry_offset(idx) + K::LEN;
        PageId::read_from(&self.buf.as_ref()[offset..offset + 4])
    }

    /// Index of the entry whose child pointer equals `value`.
    pub fn value_index(&self, value: PageId) -> Option<usize> {
        (0..self.size()).find(|&idx| self.value_at(idx) == value)
    }

    /// The child pointer whose key range contains `key`. Search starts at
    /// entry 1; entry 0's key is never compared.
    pub fn lookup<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> PageId {
        let size = self.size();
        debug_assert!(size >= 1);
        for idx in 1..size {
            if cmp.compare(key, &self.key_at(idx)).is_lt() {
                return self.value_at(idx - 1);
            }
        }
        self.value_at(size - 1)
    }

    fn entries(&self, range: std::ops::Range<usize>) -> Vec<(K, PageId)> {
        range.map(|idx| (self.key_at(idx), self.value_at(idx))).collect()
    }
}

impl<B, K> InternalPage<B, K>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
    K: Storable,
{
    fn header_mut(&mut self) -> BTreePage<&mut [u8]> {
        BTreePage::new(self.buf.as_mut())
    }

    /// Initialize a fresh internal page.
    pub fn init(&mut self, page_id: PageId, parent_page_id: PageId, max_size: usize) {
        assert!(max_size <= Self::CAPACITY, "max size exceeds page capacity");
        let mut header = self.header_mut();
        header.set_page_type(IndexPageType::Internal);
        header.set_size(0);
        header.set_max_size(max_size);
        header.set_page_id(page_id);
        header.set_parent_page_id(parent_page_id);
    }

    fn set_size(&mut self, size: usize) {
        self.header_mut().set_size(size);
    }

    pub fn set_key_at(&mut self, idx: usize, key: &K) {
        let offset = Self::entry_offset(idx);
        key.write_to(&mut self.buf.as_mut()[offset..offset + K::LEN]);
    }

    pub fn set_value_at(&mut self, idx: usize, value: PageId) {
        let offset = Self::entry_offset(idx) + K::LEN;
        value.write_to(&mut self.buf.as_mut()[offset..offset + 4]);
    }

    fn set_entry(&mut self, idx: usize, key: &K, value: PageId) {
        self.set_key_at(idx, key);
        self.set_value_at(idx, value);
    }

    /// Shift entries `[from, size)` by `by` slots (positive = right).
    fn shift_entries(&mut self, from: usize, by: isize) {
        let size = self.size();
        if from >= size {
            return;
        }
        let start = Self::entry_offset(from);
        let end = start + (size - from) * Self::ENTRY_LEN;
        let dst = (start as isize + by * Self::ENTRY_LEN as isize) as usize;
        self.buf.as_mut().copy_within(start..end, dst);
    }

    /// Turn this page into a root over exactly two children.
    pub fn populate_new_root(&mut self, old_value: PageId, new_key: &K, new_value: PageId) {
        self.set_size(2);
        self.set_value_at(0, old_value);
        self.set_entry(1, new_key, new_value);
    }

    /// Insert `(new_key, new_value)` directly after the entry whose child
    /// is `old_value`, shifting the suffix. Returns the new size; if
    /// `old_value` is absent the page is left untouched.
    pub fn insert_node_after(&mut self, old_value: PageId, new_key: &K, new_value: PageId) -> usize {
        let Some(old_idx) = self.value_index(old_value) else {
            debug_assert!(false, "insert after a child not in this page");
            return self.size();
        };
        let size = self.size();
        assert!(size < Self::CAPACITY, "insert overflows the page");
        self.shift_entries(old_idx + 1, 1);
        self.set_size(size + 1);
        self.set_entry(old_idx + 1, new_key, new_value);
        size + 1
    }

    /// Remove entry `idx`, keeping the remainder contiguous.
    pub fn remove(&mut self, idx: usize) {
        let size = self.size();
        debug_assert!(idx < size);
        self.shift_entries(idx + 1, -1);
        self.set_size(size - 1);
    }

    /// Collapse a one-child page, returning the orphaned child pointer.
    /// `None` unless the page holds exactly one entry.
    pub fn remove_and_return_only_child(&mut self) -> Option<PageId> {
        if self.size() != 1 {
            return None;
        }
        let child = self.value_at(0);
        self.set_size(0);
        Some(child)
    }

    /// Move the upper half of this page's entries to `recipient` (assumed
    /// freshly initialized), re-parenting the moved children.
    pub fn move_half_to(
        &mut self,
        recipient: &mut InternalPage<impl AsRef<[u8]> + AsMut<[u8]>, K>,
        bpm: &dyn BufferPool,
    ) -> QuarryResult<()> {
        let size = self.size();
        let moved = size / 2;
        let entries = self.entries(size - moved..size);
        recipient.copy_n_from(&entries, bpm)?;
        self.set_size(size - moved);
        Ok(())
    }

    /// Append `items`, adopting each child: its parent pointer is rewritten
    /// to this page through the buffer pool and unpinned dirty.
    pub fn copy_n_from(&mut self, items: &[(K, PageId)], bpm: &dyn BufferPool) -> QuarryResult<()> {
        let mut size = self.size();
        assert!(size + items.len() <= Self::CAPACITY, "copy overflows the page");
        for (key, child) in items {
            self.set_entry(size, key, *child);
            size += 1;
            self.adopt(*child, bpm)?;
        }
        self.set_size(size);
        Ok(())
    }

    /// Move every entry to `recipient`, writing `middle_key` (the parent's
    /// separator) into the dummy slot so it survives the move.
    pub fn move_all_to(
        &mut self,
        recipient: &mut InternalPage<impl AsRef<[u8]> + AsMut<[u8]>, K>,
        middle_key: &K,
        bpm: &dyn BufferPool,
    ) -> QuarryResult<()> {
        self.set_key_at(0, middle_key);
        let entries = self.entries(0..self.size());
        recipient.copy_n_from(&entries, bpm)?;
        self.set_size(0);
        Ok(())
    }

    /// Move this page's first entry to the tail of `recipient`, carrying
    /// `middle_key` as the moved entry's separator.
    pub fn move_first_to_end_of(
        &mut self,
        recipient: &mut InternalPage<impl AsRef<[u8]> + AsMut<[u8]>, K>,
        middle_key: &K,
        bpm: &dyn BufferPool,
    ) -> QuarryResult<()> {
        self.set_key_at(0, middle_key);
        let entry = (self.key_at(0), self.value_at(0));
        recipient.copy_last_from(entry, bpm)?;
        self.remove(0);
        Ok(())
    }

    /// Append one adopted entry.
    pub fn copy_last_from(&mut self, pair: (K, PageId), bpm: &dyn BufferPool) -> QuarryResult<()> {
        let size = self.size();
        assert!(size < Self::CAPACITY, "copy overflows the page");
        self.set_entry(size, &pair.0, pair.1);
        self.set_size(size + 1);
        self.adopt(pair.1, bpm)
    }

    /// Move this page's last entry to the front of `recipient`. The
    /// recipient's displaced dummy slot becomes entry 1 and takes
    /// `middle_key` as its separator.
    pub fn move_last_to_front_of(
        &mut self,
        recipient: &mut InternalPage<impl AsRef<[u8]> + AsMut<[u8]>, K>,
        middle_key: &K,
        bpm: &dyn BufferPool,
    ) -> QuarryResult<()> {
        let size = self.size();
        debug_assert!(size > 0);
        let entry = (self.key_at(size - 1), self.value_at(size - 1));
        recipient.copy_first_from(entry, bpm)?;
        recipient.set_key_at(1, middle_key);
        self.set_size(size - 1);
        Ok(())
    }

    /// Prepend one adopted entry, shifting the rest right.
    pub fn copy_first_from(&mut self, pair: (K, PageId), bpm: &dyn BufferPool) -> QuarryResult<()> {
        let size = self.size();
        assert!(size < Self::CAPACITY, "copy overflows the page");
        self.shift_entries(0, 1);
        self.set_size(size + 1);
        self.set_entry(0, &pair.0, pair.1);
        self.adopt(pair.1, bpm)
    }

    /// Rewrite `child`'s parent pointer to this page.
    fn adopt(&self, child: PageId, bpm: &dyn BufferPool) -> QuarryResult<()> {
        let page_id = self.page_id();
        let child_page = bpm.fetch_page(child)?.ok_or_else(pool_exhausted)?;
        {
            let mut guard = child_page.write();
            BTreePage::new(&mut *guard).set_parent_page_id(page_id);
        }
        bpm.unpin_page(child, true);
        Ok(())
    }
}
