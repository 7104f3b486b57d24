//! Owned logical page buffers.

use std::fmt;

use super::page_header::{PageHeader, PageType};
use crate::common::{Error, PageId, Result};

/// One logical page: `page_size * BLOCK_SIZE` bytes, header included.
///
/// Page length is a property of the store, so the buffer is a boxed slice.
/// Pages move by value between the page manager, the cache and the tree.
///
/// # Example
/// ```
/// use plustree::storage::page::{Page, PageHeader, PageType};
///
/// let mut page = Page::new(512);
/// page.set_header(&PageHeader::new(PageType::BTreeLeaf));
/// page.body_mut()[0] = 0xFF;
/// page.update_checksum();
/// assert!(page.verify_checksum());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    data: Box<[u8]>,
}

impl Page {
    /// Zeroed page of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0u8; len].into_boxed_slice(),
        }
    }

    /// Take ownership of bytes read from storage.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Everything after the page header.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.data[PageHeader::SIZE..]
    }

    #[inline]
    pub fn body_mut(&mut self) -> &mut [u8] {
        &mut self.data[PageHeader::SIZE..]
    }

    pub fn header(&self) -> PageHeader {
        PageHeader::decode(&self.data)
    }

    /// Overwrite the header. The stored checksum is stale until
    /// [`update_checksum`](Self::update_checksum).
    pub fn set_header(&mut self, header: &PageHeader) {
        header.encode_into(&mut self.data);
    }

    /// Seal the page once its contents are final.
    pub fn update_checksum(&mut self) {
        let header = PageHeader {
            checksum: PageHeader::page_checksum(&self.data),
            ..self.header()
        };
        header.encode_into(&mut self.data);
    }

    pub fn verify_checksum(&self) -> bool {
        self.header().checksum == PageHeader::page_checksum(&self.data)
    }

    /// Header of a page that must carry a valid checksum and one of the
    /// `expected` types.
    ///
    /// # Errors
    /// - `Error::ChecksumMismatch` if the contents do not match the CRC
    /// - `Error::CorruptPage` if the type is not one of `expected`
    pub fn checked_header(&self, page_id: PageId, expected: &[PageType]) -> Result<PageHeader> {
        if !self.verify_checksum() {
            return Err(Error::ChecksumMismatch(page_id));
        }
        let header = self.header();
        if !expected.contains(&header.page_type) {
            return Err(Error::corrupt(
                page_id,
                format!("{:?} page where {:?} was expected", header.page_type, expected),
            ));
        }
        Ok(header)
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = self.header();
        f.debug_struct("Page")
            .field("len", &self.data.len())
            .field("page_type", &header.page_type)
            .field("count", &header.count)
            .field("next", &header.next)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_excludes_header() {
        let mut page = Page::new(1024);
        assert_eq!(page.len(), 1024);
        assert_eq!(page.body().len(), 1024 - PageHeader::SIZE);

        page.body_mut()[0] = 9;
        assert_eq!(page.as_slice()[PageHeader::SIZE], 9);
    }

    #[test]
    fn test_update_checksum_keeps_header_fields() {
        let mut page = Page::new(512);
        page.set_header(&PageHeader {
            count: 3,
            next: PageId(8),
            ..PageHeader::new(PageType::AllocationTable)
        });
        page.update_checksum();

        let header = page.header();
        assert_eq!(header.count, 3);
        assert_eq!(header.next, PageId(8));
        assert_ne!(header.checksum, 0);
    }

    #[test]
    fn test_checked_header() {
        let mut page = Page::new(512);
        page.set_header(&PageHeader::new(PageType::BTreeLeaf));
        page.body_mut()[10] = 7;
        page.update_checksum();

        let header = page.checked_header(PageId(5), &[PageType::BTreeLeaf]).unwrap();
        assert_eq!(header.page_type, PageType::BTreeLeaf);

        assert!(matches!(
            page.checked_header(PageId(5), &[PageType::AllocationTable]),
            Err(Error::CorruptPage { page: PageId(5), .. })
        ));

        page.body_mut()[10] = 8;
        assert!(matches!(
            page.checked_header(PageId(5), &[PageType::BTreeLeaf]),
            Err(Error::ChecksumMismatch(PageId(5)))
        ));
    }

    #[test]
    fn test_zeroed_page_fails_checksum() {
        // CRC32 of zeros is not zero.
        assert!(!Page::new(512).verify_checksum());
    }
}
