//! Page cache counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Something the page cache counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheEvent {
    /// Read served from the dirty set or the clean LRU.
    Hit,
    /// Read that had to go to the page manager while caching was on.
    Miss,
    /// Clean page pushed out of the LRU.
    Eviction,
    PageRead,
    PageWrite,
    Commit,
}

/// Running totals for one page cache.
///
/// Counters are relaxed atomics; each is independent, and readers take a
/// [`StatsSnapshot`] rather than reading fields one by one.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    pages_read: AtomicU64,
    pages_written: AtomicU64,
    commits: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, event: CacheEvent) {
        let counter = match event {
            CacheEvent::Hit => &self.hits,
            CacheEvent::Miss => &self.misses,
            CacheEvent::Eviction => &self.evictions,
            CacheEvent::PageRead => &self.pages_read,
            CacheEvent::PageWrite => &self.pages_written,
            CacheEvent::Commit => &self.commits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            pages_read: self.pages_read.load(Ordering::Relaxed),
            pages_written: self.pages_written.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.evictions,
            &self.pages_read,
            &self.pages_written,
            &self.commits,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Counter values at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
    pub pages_read: u64,
    pub pages_written: u64,
    pub commits: u64,
}

impl StatsSnapshot {
    /// Fraction of cached reads that hit, or 0.0 before any read.
    pub fn hit_rate(&self) -> f64 {
        match self.cache_hits + self.cache_misses {
            0 => 0.0,
            lookups => self.cache_hits as f64 / lookups as f64,
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hits / {} misses ({:.1}% hit rate), {} evictions, {} pages read, {} pages written, {} commits",
            self.cache_hits,
            self.cache_misses,
            self.hit_rate() * 100.0,
            self.evictions,
            self.pages_read,
            self.pages_written,
            self.commits
        )
    }
}
