//! quarry-index: disk-backed index structures over the buffer pool.
//!
//! The extendible hash table and the B+ tree pages never touch page bytes
//! directly: they construct typed views over latch guards handed out by
//! `quarry-storage`, and report dirtiness when unpinning.

pub mod btree_internal_page;
pub mod btree_page;
pub mod bucket_page;
pub mod directory_page;
pub mod extendible_hash_table;
pub mod key;

pub use btree_internal_page::{internal_page_capacity, InternalPage};
pub use btree_page::{BTreePage, IndexPageType, BTREE_PAGE_HEADER_LEN};
pub use bucket_page::{bucket_array_size, BucketPage};
pub use directory_page::{DirectoryPage, DIRECTORY_ARRAY_SIZE, MAX_DEPTH};
pub use extendible_hash_table::ExtendibleHashTable;
pub use key::{
    DefaultKeyHasher, GenericKey, IdentityHasher, KeyComparator, KeyHasher, OrdComparator,
    Storable,
};

use quarry_common::QuarryError;

/// Every index operation needs frames for the pages it touches; a pool with
/// nothing evictable is fatal at this layer, not a soft failure.
pub(crate) fn pool_exhausted() -> QuarryError {
    QuarryError::Storage("buffer pool exhausted: all frames are pinned".into())
}
