//! Logical page identifier type.

use std::fmt;

/// Identifies a logical page in a store.
///
/// Tree nodes, PAT slices and the file header all address each other by
/// page id; there are no in-memory links between pages.
///
/// # Example
/// ```
/// use plustree::PageId;
///
/// let page_id = PageId::new(3);
/// assert!(page_id.is_valid());
/// assert_eq!(page_id.byte_offset(512), 1536);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// "No page": the end of a PAT chain, or an unset pointer.
    pub const INVALID: PageId = PageId(u32::MAX);

    #[inline]
    pub fn new(id: u32) -> Self {
        PageId(id)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Position in a page array or bitmap.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Where this page starts in a file of `page_bytes`-sized pages.
    #[inline]
    pub fn byte_offset(&self, page_bytes: usize) -> u64 {
        u64::from(self.0) * page_bytes as u64
    }
}

impl From<u32> for PageId {
    fn from(id: u32) -> Self {
        PageId(id)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "page {}", self.0)
        } else {
            f.write_str("page <none>")
        }
    }
}
