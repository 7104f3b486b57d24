//! File header - the schema and root pointers of a store.
//!
//! The [`FileHeader`] lives in page 0. Writing it is the last step of every
//! commit, which makes it the single switch between the previous committed
//! tree and the new one.

use crate::common::config::{BLOCK_SIZE, FILE_MAGIC, FORMAT_VERSION, HEADER_PAGE_ID};
use crate::common::{Error, Geometry, PageId, Result};
use crate::storage::page::{Page, PageHeader, PageType};

const FLAG_ENABLE_CACHE: u8 = 0b001;
const FLAG_LARGE_PAT: u8 = 0b010;
const FLAG_BALANCE: u8 = 0b100;
const FLAG_TAIL_SPLITS: u8 = 0b1000;

/// Persistent store metadata.
///
/// # Layout (body of page 0, little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       8     magic "PLUSTREE"
/// 8       2     version
/// 10      4     key_bytes
/// 14      4     data_bytes
/// 18      4     page_size (blocks)
/// 22      4     root_page_id
/// 26      4     pat_location
/// 30      4     pat_page_count
/// 34      4     tree_height
/// 38      8     record_count
/// 46      1     flags (bit0 cache, bit1 large_pat, bit2 balance, bit3 tail splits)
/// 47      4     live_pages
/// ```
///
/// `live_pages` counts the header, the PAT pages and every page of the
/// committed tree. An allocation table that marks more pages used than
/// this was written by a commit that never reached its header.
///
/// The tail-split flag is set once any committed node was split by the
/// append policy; such a tree is not held to half-full occupancy.
///
/// The body plus the page header fits in the first physical block, so
/// [`FileHeader::probe_page_size`] can read the page size before the
/// logical page size is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub key_bytes: u32,
    pub data_bytes: u32,
    pub page_size: u32,
    pub root_page_id: PageId,
    pub pat_location: PageId,
    pub pat_page_count: u32,
    pub tree_height: u32,
    pub record_count: u64,
    pub enable_cache: bool,
    pub large_pat: bool,
    pub balance: bool,
    pub tail_splits: bool,
    pub live_pages: u32,
}

impl FileHeader {
    /// Size of the encoded body in bytes.
    pub const BODY_SIZE: usize = 51;

    const OFFSET_MAGIC: usize = 0;
    const OFFSET_VERSION: usize = 8;
    const OFFSET_KEY_BYTES: usize = 10;
    const OFFSET_DATA_BYTES: usize = 14;
    const OFFSET_PAGE_SIZE: usize = 18;
    const OFFSET_ROOT: usize = 22;
    const OFFSET_PAT_LOCATION: usize = 26;
    const OFFSET_PAT_PAGES: usize = 30;
    const OFFSET_HEIGHT: usize = 34;
    const OFFSET_RECORDS: usize = 38;
    const OFFSET_FLAGS: usize = 46;
    const OFFSET_LIVE_PAGES: usize = 47;

    /// Header for a freshly created store.
    pub fn new(
        geometry: &Geometry,
        root_page_id: PageId,
        pat_location: PageId,
        enable_cache: bool,
        balance: bool,
    ) -> Self {
        Self {
            key_bytes: geometry.key_bytes as u32,
            data_bytes: geometry.data_bytes as u32,
            page_size: geometry.page_size,
            root_page_id,
            pat_location,
            pat_page_count: 1,
            tree_height: 1,
            record_count: 0,
            enable_cache,
            large_pat: geometry.large_pat,
            balance,
            tail_splits: false,
            // Header, first PAT page and the root leaf.
            live_pages: 3,
        }
    }

    /// Geometry recorded in this header.
    pub fn geometry(&self) -> Geometry {
        Geometry {
            key_bytes: self.key_bytes as usize,
            data_bytes: self.data_bytes as usize,
            page_size: self.page_size,
            large_pat: self.large_pat,
        }
    }

    /// Fail with `GeometryMismatch` on the first field that differs.
    pub fn validate_geometry(&self, expected: &Geometry) -> Result<()> {
        let checks: [(&'static str, u64, u64); 4] = [
            ("key_bytes", expected.key_bytes as u64, self.key_bytes as u64),
            ("data_bytes", expected.data_bytes as u64, self.data_bytes as u64),
            ("page_size", expected.page_size as u64, self.page_size as u64),
            ("large_pat", expected.large_pat as u64, self.large_pat as u64),
        ];
        for (field, expected, found) in checks {
            if expected != found {
                return Err(Error::GeometryMismatch {
                    field,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Encode into a full logical page with header and checksum.
    pub fn to_page(&self, page_bytes: usize) -> Page {
        let mut page = Page::new(page_bytes);
        page.set_header(&PageHeader::new(PageType::FileHeader));

        let body = page.body_mut();
        body[Self::OFFSET_MAGIC..Self::OFFSET_MAGIC + 8].copy_from_slice(&FILE_MAGIC);
        put_u16(body, Self::OFFSET_VERSION, FORMAT_VERSION);
        put_u32(body, Self::OFFSET_KEY_BYTES, self.key_bytes);
        put_u32(body, Self::OFFSET_DATA_BYTES, self.data_bytes);
        put_u32(body, Self::OFFSET_PAGE_SIZE, self.page_size);
        put_u32(body, Self::OFFSET_ROOT, self.root_page_id.0);
        put_u32(body, Self::OFFSET_PAT_LOCATION, self.pat_location.0);
        put_u32(body, Self::OFFSET_PAT_PAGES, self.pat_page_count);
        put_u32(body, Self::OFFSET_HEIGHT, self.tree_height);
        body[Self::OFFSET_RECORDS..Self::OFFSET_RECORDS + 8]
            .copy_from_slice(&self.record_count.to_le_bytes());
        body[Self::OFFSET_FLAGS] = self.flags();
        put_u32(body, Self::OFFSET_LIVE_PAGES, self.live_pages);

        page.update_checksum();
        page
    }

    /// Decode and validate page 0.
    pub fn from_page(page: &Page) -> Result<Self> {
        if page.len() < PageHeader::SIZE + Self::BODY_SIZE {
            return Err(Error::CorruptHeader("header page truncated".into()));
        }
        page.checked_header(HEADER_PAGE_ID, &[PageType::FileHeader])
            .map_err(|e| Error::CorruptHeader(e.to_string()))?;

        let body = page.body();
        check_magic_and_version(body)?;

        let flags = body[Self::OFFSET_FLAGS];
        let header = Self {
            key_bytes: get_u32(body, Self::OFFSET_KEY_BYTES),
            data_bytes: get_u32(body, Self::OFFSET_DATA_BYTES),
            page_size: get_u32(body, Self::OFFSET_PAGE_SIZE),
            root_page_id: PageId(get_u32(body, Self::OFFSET_ROOT)),
            pat_location: PageId(get_u32(body, Self::OFFSET_PAT_LOCATION)),
            pat_page_count: get_u32(body, Self::OFFSET_PAT_PAGES),
            tree_height: get_u32(body, Self::OFFSET_HEIGHT),
            record_count: u64::from_le_bytes(
                body[Self::OFFSET_RECORDS..Self::OFFSET_RECORDS + 8]
                    .try_into()
                    .map_err(|_| Error::CorruptHeader("record count truncated".into()))?,
            ),
            enable_cache: flags & FLAG_ENABLE_CACHE != 0,
            large_pat: flags & FLAG_LARGE_PAT != 0,
            balance: flags & FLAG_BALANCE != 0,
            tail_splits: flags & FLAG_TAIL_SPLITS != 0,
            live_pages: get_u32(body, Self::OFFSET_LIVE_PAGES),
        };

        if header.page_size as usize * BLOCK_SIZE != page.len() {
            return Err(Error::CorruptHeader(format!(
                "page_size {} does not match a {} byte page",
                header.page_size,
                page.len()
            )));
        }
        header
            .geometry()
            .validate()
            .map_err(|e| Error::CorruptHeader(e.to_string()))?;
        if !header.root_page_id.is_valid() || !header.pat_location.is_valid() {
            return Err(Error::CorruptHeader("root or PAT pointer unset".into()));
        }
        if header.pat_page_count == 0 || header.tree_height == 0 {
            return Err(Error::CorruptHeader("empty PAT chain or tree".into()));
        }
        Ok(header)
    }

    /// Read the page size from the first physical block of a store.
    ///
    /// Only magic and version are checked here; the checksum covers the
    /// whole logical page and is verified by [`FileHeader::from_page`].
    pub fn probe_page_size(block: &[u8]) -> Result<u32> {
        if block.len() < PageHeader::SIZE + Self::BODY_SIZE {
            return Err(Error::CorruptHeader("store shorter than one block".into()));
        }
        if PageType::from(block[PageHeader::OFFSET_PAGE_TYPE]) != PageType::FileHeader {
            return Err(Error::CorruptHeader("block 0 is not a file header".into()));
        }
        let body = &block[PageHeader::SIZE..];
        check_magic_and_version(body)?;
        Ok(get_u32(body, Self::OFFSET_PAGE_SIZE))
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.enable_cache {
            flags |= FLAG_ENABLE_CACHE;
        }
        if self.large_pat {
            flags |= FLAG_LARGE_PAT;
        }
        if self.balance {
            flags |= FLAG_BALANCE;
        }
        if self.tail_splits {
            flags |= FLAG_TAIL_SPLITS;
        }
        flags
    }
}

fn check_magic_and_version(body: &[u8]) -> Result<()> {
    if body[..8] != FILE_MAGIC {
        return Err(Error::CorruptHeader("bad magic".into()));
    }
    let version = u16::from_le_bytes([body[8], body[9]]);
    if version != FORMAT_VERSION {
        return Err(Error::CorruptHeader(format!(
            "unsupported format version {}",
            version
        )));
    }
    Ok(())
}

#[inline]
fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

// ============================================================================
// TESTS
// ============================================================================
