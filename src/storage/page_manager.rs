//! Page Manager - raw logical page I/O.
//!
//! The [`PageManager`] maps logical page ids to physical storage and moves
//! whole pages in and out of it:
//! - Memory mode keeps pages in a RAM array
//! - Disk mode does positioned reads/writes on a single file

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::{BLOCK_SIZE, MAX_PAGE_BLOCKS};
use crate::common::{Error, PageId, Result};
use crate::storage::file_header::FileHeader;
use crate::storage::page::Page;

enum Backend {
    Memory(Vec<Page>),
    File(File),
}

/// Reads and writes logical pages of one store.
///
/// # File Layout
/// ```text
/// ┌──────────┬──────────┬──────────┬─────────┬──────────┐
/// │ Page 0   │ Page 1   │ Page 2   │  ...    │ Page N   │
/// │ header   │ PAT      │ root/... │         │          │
/// └──────────┴──────────┴──────────┴─────────┴──────────┘
/// Offset:  0       P         2P       ...       N×P
/// ```
///
/// where `P = page_size × BLOCK_SIZE`.
///
/// # Thread Safety
/// `PageManager` is **single-threaded**. The engine that owns it is
/// responsible for serializing access.
///
/// # Durability
/// Writes are not synced individually. The page cache calls [`sync`]
/// between the phases of a commit so each phase is durable before the next
/// begins.
///
/// [`sync`]: PageManager::sync
pub struct PageManager {
    backend: Backend,
    page_bytes: usize,
    /// Number of pages in the store.
    page_count: u32,
}

impl PageManager {
    /// Create an empty RAM-backed store.
    pub fn memory(page_size: u32) -> Self {
        Self {
            backend: Backend::Memory(Vec::new()),
            page_bytes: page_size as usize * BLOCK_SIZE,
            page_count: 0,
        }
    }

    /// Create (or truncate) a file-backed store.
    pub fn create_file<P: AsRef<Path>>(path: P, page_size: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            backend: Backend::File(file),
            page_bytes: page_size as usize * BLOCK_SIZE,
            page_count: 0,
        })
    }

    /// Open an existing file-backed store.
    ///
    /// The logical page size is read from the header in block 0.
    ///
    /// # Errors
    /// Returns `Error::CorruptHeader` if block 0 is not a header or the file
    /// length is not a whole number of pages.
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let file_size = file.metadata()?.len();
        if file_size < BLOCK_SIZE as u64 {
            return Err(Error::CorruptHeader(format!(
                "store is {} bytes, shorter than one block",
                file_size
            )));
        }

        let mut block = [0u8; BLOCK_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut block)?;
        let page_size = FileHeader::probe_page_size(&block)?;
        if page_size == 0 || page_size > MAX_PAGE_BLOCKS {
            return Err(Error::CorruptHeader(format!(
                "page_size {} out of range",
                page_size
            )));
        }

        let page_bytes = page_size as usize * BLOCK_SIZE;
        if file_size % page_bytes as u64 != 0 {
            return Err(Error::CorruptHeader(format!(
                "store length {} is not a multiple of the {} byte page",
                file_size, page_bytes
            )));
        }
        let page_count = u32::try_from(file_size / page_bytes as u64)
            .map_err(|_| Error::CorruptHeader("store exceeds page id space".into()))?;

        Ok(Self {
            backend: Backend::File(file),
            page_bytes,
            page_count,
        })
    }

    /// Read a page.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page lies beyond the end of the
    /// store.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        if !page_id.is_valid() || page_id.0 >= self.page_count {
            return Err(Error::PageNotFound(page_id));
        }

        let page_bytes = self.page_bytes;
        match &mut self.backend {
            Backend::Memory(pages) => Ok(pages[page_id.index()].clone()),
            Backend::File(file) => {
                let offset = page_id.byte_offset(page_bytes);
                file.seek(SeekFrom::Start(offset))?;

                let mut data = vec![0u8; page_bytes];
                file.read_exact(&mut data)?;
                Ok(Page::from_bytes(data))
            }
        }
    }

    /// Write a page.
    ///
    /// Writing beyond the current end extends the store; any skipped pages
    /// read back as zeros.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if the page has the wrong length and
    /// `Error::PageNotFound` for the `INVALID` sentinel.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        if !page_id.is_valid() {
            return Err(Error::PageNotFound(page_id));
        }
        if page.len() != self.page_bytes {
            return Err(Error::InvalidConfig(format!(
                "page of {} bytes written to a store of {} byte pages",
                page.len(),
                self.page_bytes
            )));
        }

        let page_bytes = self.page_bytes;
        match &mut self.backend {
            Backend::Memory(pages) => {
                let index = page_id.index();
                if index >= pages.len() {
                    pages.resize_with(index + 1, || Page::new(page_bytes));
                }
                pages[index].as_mut_slice().copy_from_slice(page.as_slice());
            }
            Backend::File(file) => {
                let offset = page_id.byte_offset(page_bytes);
                file.seek(SeekFrom::Start(offset))?;
                file.write_all(page.as_slice())?;
            }
        }

        if page_id.0 >= self.page_count {
            self.page_count = page_id.0 + 1;
        }
        Ok(())
    }

    /// Flush written pages to stable storage (no-op in memory).
    pub fn sync(&mut self) -> Result<()> {
        if let Backend::File(file) = &mut self.backend {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Get the number of pages in the store.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Logical page size in bytes.
    #[inline]
    pub fn page_bytes(&self) -> usize {
        self.page_bytes
    }

    /// Whether pages outlive the process.
    #[inline]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, Backend::File(_))
    }

    /// Get the total size of the store in bytes.
    #[inline]
    pub fn store_size(&self) -> u64 {
        self.page_count as u64 * self.page_bytes as u64
    }
}
