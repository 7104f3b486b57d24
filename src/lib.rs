//! plustree - a page-oriented B+Tree storage engine for fixed-length records.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            plustree                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Engine Facade (engine/)                     │   │
//! │  │   open → insert / find → commit → close                  │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              B+Tree Core (index/btree/)                  │   │
//! │  │   ┌─────────────────────────────────────────────────┐   │   │
//! │  │   │  Split strategies: Balanced | Append            │   │   │
//! │  │   └─────────────────────────────────────────────────┘   │   │
//! │  │      Node codec + search + insert + integrity check      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                    ↓                       ↓                    │
//! │  ┌──────────────────────────┐  ┌──────────────────────────┐    │
//! │  │ Page Cache (buffer/)     │  │ PAT (allocation/)         │    │
//! │  │ dirty set + clean LRU    │  │ compact | chained bitmap  │    │
//! │  └──────────────────────────┘  └──────────────────────────┘    │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                       │   │
//! │  │     PageManager + Page + PageHeader + FileHeader         │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, Error, Geometry, Options)
//! - [`storage`] - Page formats, file header, page I/O
//! - [`allocation`] - Page allocation table
//! - [`buffer`] - Page cache and statistics
//! - [`index`] - The B+Tree
//! - [`engine`] - Public facade
//! - [`encoding`] - Fixed-length key and value helpers
//!
//! # Quick Start
//! ```no_run
//! use plustree::encoding::{numeric_key, text_field};
//! use plustree::{Engine, Geometry, Options};
//!
//! let geometry = Geometry::new(16, 64, 8);
//! let mut engine = Engine::create_or_open("customers.btp", geometry, Options::default()).unwrap();
//!
//! engine
//!     .insert(&numeric_key(1001, 16).unwrap(), &text_field("Ada Lovelace", 64))
//!     .unwrap();
//! engine.close().unwrap();
//! ```

pub mod allocation;
pub mod buffer;
pub mod common;
pub mod encoding;
pub mod engine;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::{BLOCK_SIZE, MAX_PAGE_BLOCKS};
pub use common::{Error, Geometry, Options, PageId, Result};

pub use buffer::{CacheStats, StatsSnapshot};
pub use engine::{Engine, Location, OpenMode, SharedEngine};
pub use index::IntegrityReport;
