//! Page buffering.
//!
//! The page cache sits between the tree and the page manager. It either
//! buffers writes until commit or passes them straight through.
//!
//! # Components
//! - [`PageCache`] - Dirty page set, clean LRU, ordered commit
//! - [`CacheStats`] - Performance statistics

mod page_cache;
mod stats;

pub use page_cache::PageCache;
pub use stats::{CacheStats, StatsSnapshot};
