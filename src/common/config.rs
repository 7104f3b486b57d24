//! Configuration constants and store/session settings.
//!
//! Two kinds of settings exist:
//! - [`Geometry`] is persisted in the file header and is fixed for the
//!   lifetime of a store.
//! - [`Options`] apply to one open session and may differ between opens.

use super::error::{Error, Result};
use super::PageId;
use crate::storage::page::PageHeader;

/// Size of a physical block in bytes.
///
/// A logical page is `page_size` contiguous blocks.
pub const BLOCK_SIZE: usize = 512;

/// Largest logical page, in blocks (64KB).
///
/// Keeps every per-page record count within the `u16` page header field.
pub const MAX_PAGE_BLOCKS: u32 = 128;

/// Magic bytes at the start of the file header body.
pub const FILE_MAGIC: [u8; 8] = *b"PLUSTREE";

/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 2;

/// Page holding the file header.
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// First (and, for compact stores, only) allocation table page.
pub const FIRST_PAT_PAGE_ID: PageId = PageId(1);

/// Fewest records/separators a node must be able to hold.
///
/// Below three a split cannot leave both halves non-empty under every
/// strategy.
pub const MIN_NODE_CAPACITY: usize = 3;

/// Default number of clean pages retained by the page cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Width of a child pointer inside an internal node.
pub const CHILD_PTR_SIZE: usize = 4;

/// Persistent record geometry of a store.
///
/// Set at creation, stored in the file header, and validated on every
/// subsequent `CreateOrOpen`.
///
/// # Example
/// ```
/// use plustree::Geometry;
///
/// let geometry = Geometry::new(16, 32, 16);
/// assert_eq!(geometry.page_bytes(), 16 * 512);
/// assert!(geometry.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Length of every key in bytes.
    pub key_bytes: usize,
    /// Length of every data record in bytes.
    pub data_bytes: usize,
    /// Logical page size in physical blocks.
    pub page_size: u32,
    /// Chained allocation table instead of a single page.
    pub large_pat: bool,
}

impl Geometry {
    /// Geometry with a compact allocation table.
    pub fn new(key_bytes: usize, data_bytes: usize, page_size: u32) -> Self {
        Self {
            key_bytes,
            data_bytes,
            page_size,
            large_pat: false,
        }
    }

    /// Select the chained ("large") allocation table.
    pub fn with_large_pat(mut self, large_pat: bool) -> Self {
        self.large_pat = large_pat;
        self
    }

    /// Logical page size in bytes.
    #[inline]
    pub fn page_bytes(&self) -> usize {
        self.page_size as usize * BLOCK_SIZE
    }

    /// Records that fit in one leaf page.
    pub fn leaf_capacity(&self) -> usize {
        (self.page_bytes() - PageHeader::SIZE) / (self.key_bytes + self.data_bytes)
    }

    /// Separator keys that fit in one internal page.
    pub fn internal_capacity(&self) -> usize {
        (self.page_bytes() - PageHeader::SIZE - CHILD_PTR_SIZE)
            / (self.key_bytes + CHILD_PTR_SIZE)
    }

    /// Reject geometries that cannot hold a working tree.
    pub fn validate(&self) -> Result<()> {
        if self.key_bytes == 0 {
            return Err(Error::InvalidGeometry("key_bytes must be at least 1".into()));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_BLOCKS {
            return Err(Error::InvalidGeometry(format!(
                "page_size must be within 1..={} blocks, got {}",
                MAX_PAGE_BLOCKS, self.page_size
            )));
        }
        if self.key_bytes + self.data_bytes > self.page_bytes() {
            return Err(Error::InvalidGeometry(format!(
                "a {}+{} byte record does not fit a {} byte page",
                self.key_bytes,
                self.data_bytes,
                self.page_bytes()
            )));
        }
        if self.leaf_capacity() < MIN_NODE_CAPACITY {
            return Err(Error::InvalidGeometry(format!(
                "leaf holds {} records, need at least {}",
                self.leaf_capacity(),
                MIN_NODE_CAPACITY
            )));
        }
        if self.internal_capacity() < MIN_NODE_CAPACITY {
            return Err(Error::InvalidGeometry(format!(
                "internal node holds {} keys, need at least {}",
                self.internal_capacity(),
                MIN_NODE_CAPACITY
            )));
        }
        Ok(())
    }
}

/// Per-session engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Write-back page cache (`true`) or write-through (`false`).
    pub enable_cache: bool,
    /// Classic split-and-promote (`true`) or append splits (`false`).
    pub balance: bool,
    /// Clean pages retained by the cache between reads.
    pub cache_capacity: usize,
}

impl Options {
    pub fn with_cache(mut self, enable_cache: bool) -> Self {
        self.enable_cache = enable_cache;
        self
    }

    pub fn with_balance(mut self, balance: bool) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enable_cache: true,
            balance: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}
