use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use quarry_common::{QuarryError, QuarryResult};

use crate::page_id::{PageId, PAGE_SIZE};

/// Trait for reading and writing pages to block storage.
///
/// Implementations are internally synchronized. Page-id allocation is not
/// part of this contract: each buffer pool instance stripes its own ids.
pub trait DiskManager: Send + Sync {
    /// Read a page into the given buffer. The buffer must be exactly
    /// `PAGE_SIZE` bytes. Pages that were never written read back as zeros.
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> QuarryResult<()>;

    /// Write a page from the given buffer. The buffer must be exactly
    /// `PAGE_SIZE` bytes.
    fn write_page(&self, page_id: PageId, buf: &[u8]) -> QuarryResult<()>;
}

/// Filesystem-backed disk manager over a single database file.
///
/// Pages live at fixed offsets: `page_id * PAGE_SIZE`. Reads past the end of
/// the file return zeros, so a freshly allocated id is readable before its
/// first write.
pub struct FileDiskManager {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileDiskManager {
    pub fn new(path: impl AsRef<Path>) -> QuarryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| {
                QuarryError::Storage(format!("failed to open {}: {err}", path.display()))
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync file contents to durable storage.
    pub fn sync(&self) -> QuarryResult<()> {
        let file = self.file.lock().unwrap();
        file.sync_all()
            .map_err(|e| QuarryError::Storage(format!("sync error: {e}")))?;
        Ok(())
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> QuarryResult<()> {
        assert_eq!(buf.len(), PAGE_SIZE);
        assert!(page_id.is_valid(), "read of invalid page id");
        let mut file = self.file.lock().unwrap();
        let offset = page_id.offset();

        let file_len = file
            .seek(SeekFrom::End(0))
            .map_err(|e| QuarryError::Storage(format!("seek error: {e}")))?;

        if offset >= file_len {
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| QuarryError::Storage(format!("seek error: {e}")))?;

        let bytes_available = (file_len - offset) as usize;
        if bytes_available < PAGE_SIZE {
            // Partial page: read what exists, zero the rest.
            buf.fill(0);
            file.read_exact(&mut buf[..bytes_available])
                .map_err(|e| QuarryError::Storage(format!("read error: {e}")))?;
        } else {
            file.read_exact(buf)
                .map_err(|e| QuarryError::Storage(format!("read error: {e}")))?;
        }

        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> QuarryResult<()> {
        assert_eq!(buf.len(), PAGE_SIZE);
        assert!(page_id.is_valid(), "write of invalid page id");
        let mut file = self.file.lock().unwrap();

        file.seek(SeekFrom::Start(page_id.offset()))
            .map_err(|e| QuarryError::Storage(format!("seek error: {e}")))?;
        file.write_all(buf)
            .map_err(|e| QuarryError::Storage(format!("write error: {e}")))?;

        Ok(())
    }
}

/// In-memory disk manager for tests. No I/O.
pub struct MemoryDiskManager {
    pages: Mutex<HashMap<PageId, Box<[u8]>>>,
}

impl MemoryDiskManager {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
        }
    }

    /// Number of pages ever written.
    pub fn page_count(&self) -> usize {
        self.pages.lock().unwrap().len()
    }

    /// Snapshot of a page's on-disk contents, if it was ever written.
    /// Lets tests observe eviction write-back without going through a frame.
    pub fn page(&self, page_id: PageId) -> Option<Vec<u8>> {
        self.pages.lock().unwrap().get(&page_id).map(|p| p.to_vec())
    }
}

impl Default for MemoryDiskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> QuarryResult<()> {
        assert_eq!(buf.len(), PAGE_SIZE);
        let pages = self.pages.lock().unwrap();
        if let Some(data) = pages.get(&page_id) {
            buf.copy_from_slice(data);
        } else {
            buf.fill(0);
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> QuarryResult<()> {
        assert_eq!(buf.len(), PAGE_SIZE);
        let mut pages = self.pages.lock().unwrap();
        pages.insert(page_id, buf.to_vec().into_boxed_slice());
        Ok(())
    }
}
