//! Page Allocation Table - which logical pages are in use.
//!
//! The in-memory bitmap is authoritative during a session. It is encoded
//! into PAT pages when the engine commits, and slice by slice as it changes
//! when writes go straight through to storage.

use std::collections::HashSet;

use crate::common::config::{FIRST_PAT_PAGE_ID, HEADER_PAGE_ID};
use crate::common::{Error, PageId, Result};
use crate::storage::page::{Page, PageHeader, PageType};
use crate::storage::{get_u32, put_u32};

/// Bytes at the start of a PAT page body holding the slice's first page id.
const SLICE_START_SIZE: usize = 4;

/// How the bitmap is laid out on disk.
///
/// Chosen at creation and recorded in the file header (`large_pat`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatLayout {
    /// One PAT page; the store can never grow past the pages it can address.
    Compact,
    /// A linked chain of PAT pages, extended on demand.
    Chained,
}

impl PatLayout {
    pub fn from_large_pat(large_pat: bool) -> Self {
        if large_pat {
            PatLayout::Chained
        } else {
            PatLayout::Compact
        }
    }
}

/// Tracks free/used state of every logical page.
///
/// # Page layout
/// ```text
/// PageHeader (type = AllocationTable, count = pages covered, next = next PAT page)
/// first_page_id: u32 LE
/// bitmap: bit (i % 8) of byte (i / 8) is page first_page_id + i
/// ```
///
/// The first PAT page is always page 1 and covers pages `0..per_page`.
/// A chained table appends slice `k` at page `k * per_page`, the first id
/// of the range it covers, so every PAT page addresses itself.
///
/// # Example
/// ```
/// use plustree::allocation::{PageAllocationTable, PatLayout};
/// use plustree::PageId;
///
/// let mut pat = PageAllocationTable::new(PatLayout::Compact, 512);
/// // Header and first PAT page are reserved.
/// assert!(pat.is_used(PageId(0)) && pat.is_used(PageId(1)));
/// assert_eq!(pat.allocate().unwrap(), PageId(2));
/// ```
#[derive(Debug, Clone)]
pub struct PageAllocationTable {
    layout: PatLayout,
    page_bytes: usize,
    /// Pages addressed by one PAT page.
    per_page: u32,
    bits: Vec<u8>,
    /// PAT pages in chain order.
    pages: Vec<PageId>,
    /// No page below this id is free.
    lowest_free_hint: u32,
    used: u32,
    /// One flag per PAT page: changed since last encoded.
    dirty_slices: Vec<bool>,
}

impl PageAllocationTable {
    /// Empty table for a new store, with the header page and the first PAT
    /// page already marked used.
    pub fn new(layout: PatLayout, page_bytes: usize) -> Self {
        let per_page = Self::pages_per_slice(page_bytes);
        let mut pat = Self {
            layout,
            page_bytes,
            per_page,
            bits: vec![0u8; (per_page as usize).div_ceil(8)],
            pages: vec![FIRST_PAT_PAGE_ID],
            lowest_free_hint: 0,
            used: 0,
            dirty_slices: vec![true],
        };
        pat.set(HEADER_PAGE_ID, true);
        pat.set(FIRST_PAT_PAGE_ID, true);
        pat
    }

    /// Pages one PAT page can address.
    pub fn pages_per_slice(page_bytes: usize) -> u32 {
        let bits = (page_bytes - PageHeader::SIZE - SLICE_START_SIZE) * 8;
        u32::try_from(bits).unwrap_or(u32::MAX)
    }

    /// Allocate the lowest free page and mark it used.
    ///
    /// # Errors
    /// `Error::StoreFull` when a compact table is exhausted, or a chained
    /// table has run out of page ids.
    pub fn allocate(&mut self) -> Result<PageId> {
        let page_id = match self.find_free() {
            Some(page_id) => page_id,
            None => {
                self.extend()?;
                self.find_free().ok_or(Error::StoreFull {
                    capacity: self.capacity(),
                })?
            }
        };
        self.set(page_id, true);
        tracing::trace!(target: "plustree::pat", page = page_id.0, "allocated page");
        Ok(page_id)
    }

    /// Whether `n` more pages can be allocated without hitting `StoreFull`.
    pub fn can_allocate(&self, n: u32) -> bool {
        let free = self.capacity() - self.used;
        match self.layout {
            PatLayout::Compact => free >= n,
            // Each extension costs one page for the new PAT page itself.
            PatLayout::Chained => {
                let extra = n.saturating_sub(free) as u64;
                let slices = extra.div_ceil(self.per_page as u64 - 1);
                self.capacity() as u64 + slices * self.per_page as u64 <= u32::MAX as u64
            }
        }
    }

    /// Mark a page free. Freeing a free page is a no-op.
    ///
    /// The header page and PAT pages can never be freed.
    pub fn free(&mut self, page_id: PageId) -> Result<()> {
        if page_id == HEADER_PAGE_ID || self.pages.contains(&page_id) {
            return Err(Error::InvalidConfig(format!(
                "{} holds store metadata and cannot be freed",
                page_id
            )));
        }
        if self.is_used(page_id) {
            self.set(page_id, false);
            self.lowest_free_hint = self.lowest_free_hint.min(page_id.0);
        }
        Ok(())
    }

    /// Whether the page is currently allocated. Out-of-range ids are free.
    pub fn is_used(&self, page_id: PageId) -> bool {
        if page_id.0 >= self.capacity() {
            return false;
        }
        let i = page_id.index();
        self.bits[i / 8] & (1 << (i % 8)) != 0
    }

    /// Every used page id, ascending.
    pub fn iter_used(&self) -> impl Iterator<Item = PageId> + '_ {
        (0..self.capacity())
            .map(PageId)
            .filter(move |&page_id| self.is_used(page_id))
    }

    /// Pages currently addressable.
    pub fn capacity(&self) -> u32 {
        (self.pages.len() as u64 * self.per_page as u64).min(u32::MAX as u64) as u32
    }

    pub fn used_count(&self) -> u32 {
        self.used
    }

    pub fn layout(&self) -> PatLayout {
        self.layout
    }

    /// PAT pages in chain order.
    pub fn pat_pages(&self) -> &[PageId] {
        &self.pages
    }

    /// Whether the table changed since it was loaded or last encoded.
    pub fn is_dirty(&self) -> bool {
        self.dirty_slices.contains(&true)
    }

    pub fn mark_clean(&mut self) {
        self.dirty_slices.fill(false);
    }

    /// Encode every slice into its PAT page.
    pub fn to_pages(&self) -> Vec<(PageId, Page)> {
        (0..self.pages.len()).map(|k| self.encode_slice(k)).collect()
    }

    /// Encode only the slices changed since the last [`mark_clean`](Self::mark_clean).
    pub fn dirty_pages(&self) -> Vec<(PageId, Page)> {
        self.dirty_slices
            .iter()
            .enumerate()
            .filter(|(_, &dirty)| dirty)
            .map(|(k, _)| self.encode_slice(k))
            .collect()
    }

    /// Free every page that is neither metadata nor in `reachable`.
    ///
    /// Returns how many pages were released.
    ///
    /// # Errors
    /// `Error::CorruptPage` if a page in `reachable` is marked free.
    pub fn reclaim_unreachable(&mut self, reachable: &HashSet<PageId>) -> Result<u32> {
        if let Some(&page_id) = reachable.iter().find(|&&page_id| !self.is_used(page_id)) {
            return Err(Error::corrupt(page_id, "tree page marked free in allocation table"));
        }

        let orphans: Vec<PageId> = self
            .iter_used()
            .filter(|page_id| {
                *page_id != HEADER_PAGE_ID
                    && !self.pages.contains(page_id)
                    && !reachable.contains(page_id)
            })
            .collect();
        for &page_id in &orphans {
            self.free(page_id)?;
        }
        Ok(orphans.len() as u32)
    }

    fn encode_slice(&self, k: usize) -> (PageId, Page) {
        let slice_bytes = (self.per_page as usize).div_ceil(8);
        let first = k as u64 * self.per_page as u64;
        let covered = (self.capacity() as u64 - first).min(self.per_page as u64);

        let mut page = Page::new(self.page_bytes);
        page.set_header(&PageHeader {
            // Saturates for the large default slice; `first` and the
            // next link are what load relies on.
            count: u16::try_from(covered).unwrap_or(u16::MAX),
            next: self.pages.get(k + 1).copied().unwrap_or(PageId::INVALID),
            ..PageHeader::new(PageType::AllocationTable)
        });

        let body = page.body_mut();
        put_u32(body, 0, first as u32);
        let start = k * slice_bytes;
        let end = (start + slice_bytes).min(self.bits.len());
        body[SLICE_START_SIZE..SLICE_START_SIZE + (end - start)]
            .copy_from_slice(&self.bits[start..end]);

        page.update_checksum();
        (self.pages[k], page)
    }

    /// Rebuild the table from its PAT pages.
    ///
    /// `read` fetches a page by id. Every page must be an allocation table
    /// page with a valid checksum and the slices must be contiguous. Exactly
    /// `page_count` pages are read; a link past them belongs to a slice
    /// appended by a commit that never wrote its header, and is dropped.
    pub fn load<F>(
        layout: PatLayout,
        page_bytes: usize,
        first: PageId,
        page_count: u32,
        mut read: F,
    ) -> Result<Self>
    where
        F: FnMut(PageId) -> Result<Page>,
    {
        if first != FIRST_PAT_PAGE_ID {
            return Err(Error::corrupt(first, "allocation table must start at page 1"));
        }
        if layout == PatLayout::Compact && page_count != 1 {
            return Err(Error::corrupt(
                first,
                format!("compact allocation table spans {} pages", page_count),
            ));
        }

        let per_page = Self::pages_per_slice(page_bytes);
        let slice_bytes = (per_page as usize).div_ceil(8);
        let mut bits = Vec::with_capacity(slice_bytes * page_count as usize);
        let mut pages = Vec::with_capacity(page_count as usize);
        let mut current = first;

        while (pages.len() as u32) < page_count {
            if !current.is_valid() {
                break;
            }
            let page = read(current)?;
            let header = page.checked_header(current, &[PageType::AllocationTable])?;

            let expected_first = pages.len() as u64 * per_page as u64;
            let slice_first = get_u32(page.body(), 0) as u64;
            if slice_first != expected_first {
                return Err(Error::corrupt(
                    current,
                    format!("slice starts at {}, expected {}", slice_first, expected_first),
                ));
            }

            bits.extend_from_slice(&page.body()[SLICE_START_SIZE..SLICE_START_SIZE + slice_bytes]);
            pages.push(current);
            current = header.next;
        }

        if current.is_valid() {
            tracing::debug!(
                target: "plustree::pat",
                page = current.0,
                "ignoring allocation table page past the committed chain"
            );
        }
        if pages.len() as u32 != page_count {
            return Err(Error::corrupt(
                first,
                format!("allocation table has {} pages, expected {}", pages.len(), page_count),
            ));
        }

        let mut pat = Self {
            layout,
            page_bytes,
            per_page,
            bits,
            dirty_slices: vec![false; pages.len()],
            pages,
            lowest_free_hint: 0,
            used: 0,
        };
        pat.used = pat.iter_used().count() as u32;

        let unmarked = std::iter::once(HEADER_PAGE_ID)
            .chain(pat.pages.iter().copied())
            .find(|&page_id| !pat.is_used(page_id));
        if let Some(page_id) = unmarked {
            return Err(Error::corrupt(
                page_id,
                "metadata page not marked used in allocation table",
            ));
        }
        Ok(pat)
    }

    fn find_free(&mut self) -> Option<PageId> {
        let capacity = self.capacity();
        let mut i = self.lowest_free_hint;
        while i < capacity {
            let byte = self.bits[i as usize / 8];
            if byte == 0xFF && i % 8 == 0 {
                i += 8;
                continue;
            }
            if !self.is_used(PageId(i)) {
                self.lowest_free_hint = i;
                return Some(PageId(i));
            }
            i += 1;
        }
        self.lowest_free_hint = capacity;
        None
    }

    /// Append one slice to a chained table. The new PAT page occupies the
    /// first id of its own slice.
    fn extend(&mut self) -> Result<()> {
        let capacity = self.capacity();
        if self.layout == PatLayout::Compact || capacity == u32::MAX {
            return Err(Error::StoreFull { capacity });
        }

        let pat_page = PageId(capacity);
        if let Some(last) = self.dirty_slices.last_mut() {
            // Its next link now points at the new page.
            *last = true;
        }
        self.pages.push(pat_page);
        self.dirty_slices.push(true);
        self.bits
            .resize(self.bits.len() + (self.per_page as usize).div_ceil(8), 0);
        self.set(pat_page, true);

        tracing::debug!(
            target: "plustree::pat",
            page = pat_page.0,
            slices = self.pages.len(),
            capacity = self.capacity(),
            "extended allocation table"
        );
        Ok(())
    }

    fn set(&mut self, page_id: PageId, used: bool) {
        let i = page_id.index();
        let mask = 1u8 << (i % 8);
        let was_used = self.bits[i / 8] & mask != 0;
        if was_used == used {
            return;
        }
        if used {
            self.bits[i / 8] |= mask;
            self.used += 1;
        } else {
            self.bits[i / 8] &= !mask;
            self.used -= 1;
        }
        self.dirty_slices[i / self.per_page as usize] = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Smallest page: 512 - 12 - 4 = 496 bytes of bitmap = 3968 pages.
    const PAGE: usize = 512;
    const PER_PAGE: u32 = 3968;

    fn store(pat: &PageAllocationTable) -> HashMap<PageId, Page> {
        pat.to_pages().into_iter().collect()
    }

    #[test]
    fn test_pages_per_slice() {
        assert_eq!(PageAllocationTable::pages_per_slice(PAGE), PER_PAGE);
    }

    #[test]
    fn test_allocate_lowest_free() {
        let mut pat = PageAllocationTable::new(PatLayout::Compact, PAGE);
        assert_eq!(pat.used_count(), 2);

        assert_eq!(pat.allocate().unwrap(), PageId(2));
        assert_eq!(pat.allocate().unwrap(), PageId(3));
        assert_eq!(pat.allocate().unwrap(), PageId(4));

        pat.free(PageId(3)).unwrap();
        assert!(!pat.is_used(PageId(3)));
        assert_eq!(pat.allocate().unwrap(), PageId(3));
        assert_eq!(pat.allocate().unwrap(), PageId(5));
        assert_eq!(pat.used_count(), 6);
    }

    #[test]
    fn test_free_is_idempotent() {
        let mut pat = PageAllocationTable::new(PatLayout::Compact, PAGE);
        let page_id = pat.allocate().unwrap();

        pat.free(page_id).unwrap();
        pat.free(page_id).unwrap();
        assert_eq!(pat.used_count(), 2);

        // Never allocated and beyond capacity.
        pat.free(PageId(100_000)).unwrap();
    }

    #[test]
    fn test_metadata_pages_cannot_be_freed() {
        let mut pat = PageAllocationTable::new(PatLayout::Compact, PAGE);
        assert!(pat.free(PageId(0)).is_err());
        assert!(pat.free(PageId(1)).is_err());
    }

    #[test]
    fn test_compact_store_full() {
        let mut pat = PageAllocationTable::new(PatLayout::Compact, PAGE);
        for _ in 2..PER_PAGE {
            pat.allocate().unwrap();
        }
        assert_eq!(pat.used_count(), PER_PAGE);
        assert!(matches!(
            pat.allocate(),
            Err(Error::StoreFull { capacity: PER_PAGE })
        ));
    }

    #[test]
    fn test_can_allocate() {
        let mut compact = PageAllocationTable::new(PatLayout::Compact, PAGE);
        assert!(compact.can_allocate(PER_PAGE - 2));
        assert!(!compact.can_allocate(PER_PAGE - 1));
        for _ in 2..PER_PAGE - 1 {
            compact.allocate().unwrap();
        }
        assert!(compact.can_allocate(1));
        assert!(!compact.can_allocate(2));

        let chained = PageAllocationTable::new(PatLayout::Chained, PAGE);
        assert!(chained.can_allocate(10 * PER_PAGE));
    }

    #[test]
    fn test_chained_extends() {
        let mut pat = PageAllocationTable::new(PatLayout::Chained, PAGE);
        for _ in 2..PER_PAGE {
            pat.allocate().unwrap();
        }

        // First page of the new slice becomes its PAT page.
        let next = pat.allocate().unwrap();
        assert_eq!(next, PageId(PER_PAGE + 1));
        assert_eq!(pat.pat_pages(), &[PageId(1), PageId(PER_PAGE)]);
        assert!(pat.is_used(PageId(PER_PAGE)));
        assert_eq!(pat.capacity(), 2 * PER_PAGE);
    }

    #[test]
    fn test_roundtrip_through_pages() {
        let mut pat = PageAllocationTable::new(PatLayout::Chained, PAGE);
        for _ in 0..(PER_PAGE + 10) {
            pat.allocate().unwrap();
        }
        pat.free(PageId(17)).unwrap();
        pat.free(PageId(PER_PAGE + 3)).unwrap();

        let pages = store(&pat);
        let loaded = PageAllocationTable::load(
            PatLayout::Chained,
            PAGE,
            PageId(1),
            2,
            |id| pages.get(&id).cloned().ok_or(Error::PageNotFound(id)),
        )
        .unwrap();

        assert!(!loaded.is_dirty());
        assert_eq!(loaded.used_count(), pat.used_count());
        assert_eq!(loaded.pat_pages(), pat.pat_pages());
        assert!(loaded.iter_used().eq(pat.iter_used()));
        assert!(!loaded.is_used(PageId(17)));
    }

    #[test]
    fn test_load_rejects_corrupt_page() {
        let pat = PageAllocationTable::new(PatLayout::Compact, PAGE);
        let mut pages = store(&pat);
        if let Some(page) = pages.get_mut(&PageId(1)) {
            page.body_mut()[20] ^= 0x01;
        }

        let result = PageAllocationTable::load(PatLayout::Compact, PAGE, PageId(1), 1, |id| {
            pages.get(&id).cloned().ok_or(Error::PageNotFound(id))
        });
        assert!(matches!(result, Err(Error::ChecksumMismatch(PageId(1)))));
    }

    #[test]
    fn test_load_rejects_wrong_chain_length() {
        let pat = PageAllocationTable::new(PatLayout::Chained, PAGE);
        let pages = store(&pat);

        let result = PageAllocationTable::load(PatLayout::Chained, PAGE, PageId(1), 2, |id| {
            pages.get(&id).cloned().ok_or(Error::PageNotFound(id))
        });
        assert!(matches!(result, Err(Error::CorruptPage { .. })));
    }

    #[test]
    fn test_load_ignores_uncommitted_extension() {
        let mut pat = PageAllocationTable::new(PatLayout::Chained, PAGE);
        for _ in 0..PER_PAGE {
            pat.allocate().unwrap();
        }
        assert_eq!(pat.pat_pages().len(), 2);
        let pages = store(&pat);

        // A header that still records a single PAT page.
        let loaded = PageAllocationTable::load(PatLayout::Chained, PAGE, PageId(1), 1, |id| {
            pages.get(&id).cloned().ok_or(Error::PageNotFound(id))
        })
        .unwrap();
        assert_eq!(loaded.pat_pages(), &[PageId(1)]);
        assert_eq!(loaded.capacity(), PER_PAGE);
        assert_eq!(loaded.used_count(), PER_PAGE);

        // Re-encoding drops the stale link.
        let (_, first) = loaded.to_pages().remove(0);
        assert_eq!(first.header().next, PageId::INVALID);
    }

    #[test]
    fn test_dirty_pages_cover_changed_slices_only() {
        let mut pat = PageAllocationTable::new(PatLayout::Chained, PAGE);
        for _ in 0..(PER_PAGE + 4) {
            pat.allocate().unwrap();
        }
        pat.mark_clean();
        assert!(pat.dirty_pages().is_empty());

        pat.allocate().unwrap();
        let dirty: Vec<PageId> = pat.dirty_pages().into_iter().map(|(id, _)| id).collect();
        assert_eq!(dirty, vec![PageId(PER_PAGE)]);

        pat.free(PageId(40)).unwrap();
        let dirty: Vec<PageId> = pat.dirty_pages().into_iter().map(|(id, _)| id).collect();
        assert_eq!(dirty, vec![PageId(1), PageId(PER_PAGE)]);
    }

    #[test]
    fn test_extension_dirties_previous_slice() {
        let mut pat = PageAllocationTable::new(PatLayout::Chained, PAGE);
        for _ in 2..PER_PAGE {
            pat.allocate().unwrap();
        }
        pat.mark_clean();

        pat.allocate().unwrap();
        let dirty = pat.dirty_pages();
        assert_eq!(dirty.len(), 2);
        assert_eq!(dirty[0].1.header().next, PageId(PER_PAGE));
    }

    #[test]
    fn test_reclaim_unreachable() {
        let mut pat = PageAllocationTable::new(PatLayout::Compact, PAGE);
        for _ in 0..6 {
            pat.allocate().unwrap();
        }
        let reachable: HashSet<PageId> = [PageId(2), PageId(5)].into_iter().collect();

        assert_eq!(pat.reclaim_unreachable(&reachable).unwrap(), 4);
        let used: Vec<PageId> = pat.iter_used().collect();
        assert_eq!(used, vec![PageId(0), PageId(1), PageId(2), PageId(5)]);

        let dangling: HashSet<PageId> = [PageId(2), PageId(3)].into_iter().collect();
        assert!(matches!(
            pat.reclaim_unreachable(&dangling),
            Err(Error::CorruptPage { page: PageId(3), .. })
        ));
    }

    #[test]
    fn test_dirty_tracking() {
        let mut pat = PageAllocationTable::new(PatLayout::Compact, PAGE);
        assert!(pat.is_dirty());
        pat.mark_clean();

        pat.free(PageId(9)).unwrap();
        assert!(!pat.is_dirty());

        pat.allocate().unwrap();
        assert!(pat.is_dirty());
    }
}
