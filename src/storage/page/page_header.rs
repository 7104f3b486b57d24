//! The 12-byte header at the front of every logical page.

use crate::common::PageId;
use crate::storage::{get_u32, put_u32};

/// What a page holds. Stored as the first byte of the page.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Never written, or an unknown tag.
    #[default]
    Invalid = 0,
    FileHeader = 1,
    AllocationTable = 2,
    BTreeInternal = 3,
    BTreeLeaf = 4,
}

impl From<u8> for PageType {
    fn from(tag: u8) -> Self {
        match tag {
            1 => PageType::FileHeader,
            2 => PageType::AllocationTable,
            3 => PageType::BTreeInternal,
            4 => PageType::BTreeLeaf,
            _ => PageType::Invalid,
        }
    }
}

/// Decoded page header.
///
/// # Layout
/// ```text
/// byte 0      page type tag
/// bytes 1..5  CRC32, little-endian
/// bytes 5..7  count, little-endian
/// bytes 7..11 next page id, little-endian
/// byte 11     zero
/// ```
///
/// `count` is the number of keys in a tree node or the pages covered by a
/// PAT slice. `next` links PAT pages; every other page leaves it
/// `PageId::INVALID`.
///
/// The CRC covers the whole logical page, read as if bytes `1..5` were
/// zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub checksum: u32,
    pub count: u16,
    pub next: PageId,
}

impl Default for PageHeader {
    fn default() -> Self {
        Self::new(PageType::Invalid)
    }
}

impl PageHeader {
    pub const SIZE: usize = 12;

    pub const OFFSET_PAGE_TYPE: usize = 0;
    pub const OFFSET_CHECKSUM: usize = 1;
    const OFFSET_COUNT: usize = 5;
    const OFFSET_NEXT: usize = 7;

    /// Empty header of `page_type` with no link.
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            checksum: 0,
            count: 0,
            next: PageId::INVALID,
        }
    }

    /// Decode the header at the front of `page`, which must be at least
    /// [`SIZE`](Self::SIZE) bytes.
    pub fn decode(page: &[u8]) -> Self {
        Self {
            page_type: PageType::from(page[Self::OFFSET_PAGE_TYPE]),
            checksum: get_u32(page, Self::OFFSET_CHECKSUM),
            count: u16::from_le_bytes([page[Self::OFFSET_COUNT], page[Self::OFFSET_COUNT + 1]]),
            next: PageId(get_u32(page, Self::OFFSET_NEXT)),
        }
    }

    /// Encode into the front of `page`.
    pub fn encode_into(&self, page: &mut [u8]) {
        page[Self::OFFSET_PAGE_TYPE] = self.page_type as u8;
        put_u32(page, Self::OFFSET_CHECKSUM, self.checksum);
        page[Self::OFFSET_COUNT..Self::OFFSET_NEXT].copy_from_slice(&self.count.to_le_bytes());
        put_u32(page, Self::OFFSET_NEXT, self.next.0);
        page[Self::SIZE - 1] = 0;
    }

    /// CRC32 of a whole page with its checksum field treated as zero.
    pub fn page_checksum(page: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&page[..Self::OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 4]);
        hasher.update(&page[Self::OFFSET_COUNT..]);
        hasher.finalize()
    }
}
