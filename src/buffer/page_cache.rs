//! Page Cache - write-back buffering over the page manager.
//!
//! The [`PageCache`] provides:
//! - A dirty page set holding every page written since the last commit
//! - A bounded LRU of clean pages for repeated reads
//! - The ordered commit that makes a new tree state durable

use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;

use super::stats::{CacheEvent, CacheStats};
use crate::common::config::HEADER_PAGE_ID;
use crate::common::{PageId, Result};
use crate::storage::page::Page;
use crate::storage::PageManager;

/// Buffers page writes until commit.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                         PageCache                           │
/// │  ┌────────────────────────┐  ┌────────────────────────────┐ │
/// │  │ dirty: HashMap         │  │ clean: LruCache            │ │
/// │  │ PageId → Page (unsaved)│  │ PageId → Page (on storage) │ │
/// │  └────────────────────────┘  └────────────────────────────┘ │
/// │                  ┌──────────────────────┐                   │
/// │                  │     PageManager      │                   │
/// │                  └──────────────────────┘                   │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// A page id is never in both maps at once. Reads look in `dirty`, then
/// `clean`, then the page manager.
///
/// With caching disabled both maps stay empty: writes go straight to the
/// page manager and reads come straight from it.
///
/// # Commit ordering
/// [`commit`](PageCache::commit) writes, syncing after each step:
/// 1. every dirty tree page
/// 2. the allocation table pages
/// 3. the file header
///
/// The tree copies a committed node before changing it, so no page written
/// in step 1 (or written through earlier) belongs to the previous commit.
/// Until step 3 completes the old header still names the previous root and
/// the old tree is intact beneath it. The allocation table written in step 2
/// marks both trees' pages used; the engine frees the difference when it
/// next opens the store.
pub struct PageCache {
    manager: PageManager,
    enabled: bool,
    dirty: HashMap<PageId, Page>,
    clean: Option<LruCache<PageId, Page>>,
    stats: CacheStats,
}

impl PageCache {
    /// Wrap a page manager.
    ///
    /// `capacity` bounds the clean page LRU; zero disables read caching
    /// while keeping write-back.
    pub fn new(manager: PageManager, enabled: bool, capacity: usize) -> Self {
        let clean = if enabled {
            NonZeroUsize::new(capacity).map(LruCache::new)
        } else {
            None
        };

        Self {
            manager,
            enabled,
            dirty: HashMap::new(),
            clean,
            stats: CacheStats::new(),
        }
    }

    /// Fetch a page, preferring buffered copies.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page is neither buffered nor stored
    /// - I/O errors from the page manager
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        if let Some(page) = self.dirty.get(&page_id) {
            self.stats.record(CacheEvent::Hit);
            return Ok(page.clone());
        }
        if let Some(page) = self.clean.as_mut().and_then(|clean| clean.get(&page_id)) {
            self.stats.record(CacheEvent::Hit);
            return Ok(page.clone());
        }

        if self.enabled {
            self.stats.record(CacheEvent::Miss);
        }
        let page = self.manager.read_page(page_id)?;
        self.stats.record(CacheEvent::PageRead);

        if let Some(clean) = self.clean.as_mut() {
            if let Some((evicted, _)) = clean.push(page_id, page.clone()) {
                if evicted != page_id {
                    self.stats.record(CacheEvent::Eviction);
                }
            }
        }
        Ok(page)
    }

    /// Store a page.
    ///
    /// Write-back: the page joins the dirty set and reaches storage at the
    /// next commit. Write-through: the page is written immediately.
    pub fn write_page(&mut self, page_id: PageId, page: Page) -> Result<()> {
        if !self.enabled {
            self.manager.write_page(page_id, &page)?;
            self.stats.record(CacheEvent::PageWrite);
            return Ok(());
        }

        if let Some(clean) = self.clean.as_mut() {
            clean.pop(&page_id);
        }
        self.dirty.insert(page_id, page);
        Ok(())
    }

    /// Make buffered tree pages, then `metadata` pages, then `header`
    /// durable, in that order.
    ///
    /// The dirty set is cleared only after all three steps succeed; on
    /// error it is left intact so the caller may retry.
    pub fn commit(&mut self, metadata: Vec<(PageId, Page)>, header: Page) -> Result<()> {
        let mut dirty_ids: Vec<PageId> = self.dirty.keys().copied().collect();
        dirty_ids.sort_unstable();

        for page_id in &dirty_ids {
            if let Some(page) = self.dirty.get(page_id) {
                self.manager.write_page(*page_id, page)?;
                self.stats.record(CacheEvent::PageWrite);
            }
        }
        self.manager.sync()?;

        let metadata_pages = metadata.len();
        for (page_id, page) in &metadata {
            self.manager.write_page(*page_id, page)?;
            self.stats.record(CacheEvent::PageWrite);
        }
        self.manager.sync()?;

        self.manager.write_page(HEADER_PAGE_ID, &header)?;
        self.stats.record(CacheEvent::PageWrite);
        self.manager.sync()?;

        match self.clean.as_mut() {
            Some(clean) => {
                for (page_id, page) in self.dirty.drain() {
                    clean.put(page_id, page);
                }
                for (page_id, page) in metadata {
                    clean.put(page_id, page);
                }
                clean.put(HEADER_PAGE_ID, header);
            }
            None => self.dirty.clear(),
        }
        self.stats.record(CacheEvent::Commit);

        tracing::debug!(
            target: "plustree::cache",
            data_pages = dirty_ids.len(),
            metadata_pages,
            persistent = self.manager.is_persistent(),
            "commit flushed"
        );
        Ok(())
    }

    /// Whether writes are buffered.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Pages waiting for the next commit.
    #[inline]
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Clean pages currently retained.
    pub fn clean_count(&self) -> usize {
        self.clean.as_ref().map_or(0, |clean| clean.len())
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// The underlying page manager.
    pub fn manager(&self) -> &PageManager {
        &self.manager
    }
}
