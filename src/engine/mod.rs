//! Engine facade: one store, one tree, one session.
//!
//! [`Engine`] wires the layers together and is the only type most callers
//! need:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                   Engine                     │
//! │  insert / find / get / commit / close        │
//! ├──────────────────────────────────────────────┤
//! │  BPlusTree        PageAllocationTable        │
//! ├──────────────────────────────────────────────┤
//! │                 PageCache                    │
//! ├──────────────────────────────────────────────┤
//! │        PageManager (memory | file)           │
//! └──────────────────────────────────────────────┘
//! ```

mod shared;

pub use shared::SharedEngine;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::allocation::{PageAllocationTable, PatLayout};
use crate::buffer::{PageCache, StatsSnapshot};
use crate::common::config::{FIRST_PAT_PAGE_ID, HEADER_PAGE_ID};
use crate::common::{Error, Geometry, Options, Result};
use crate::index::btree::{strategy_for, BPlusTree, IntegrityReport, Node};
use crate::storage::{FileHeader, PageManager};

/// Where a store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// RAM only; gone when the engine is dropped.
    Memory,
    /// A single file.
    Path(PathBuf),
}

impl Location {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Location::Path(path.into())
    }
}

/// How [`Engine::open`] treats an existing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Always start a new, empty store, truncating any existing file.
    Create(Geometry),
    /// Open the store if present (its geometry must match), otherwise
    /// create it.
    CreateOrOpen(Geometry),
    /// Open a store that must already exist; geometry comes from its header.
    OpenExisting,
}

/// A B+Tree store of fixed-length keys and records.
///
/// Inserts are visible to lookups immediately. They become durable at
/// [`commit`](Engine::commit) or [`close`](Engine::close); dropping an
/// engine without either discards them and leaves the last committed state
/// on disk.
///
/// # Example
/// ```
/// use plustree::{Engine, Geometry, Options};
///
/// let mut engine = Engine::create_memory(Geometry::new(8, 4, 1), Options::default()).unwrap();
/// assert!(engine.insert(b"apple\0\0\0", b"red!").unwrap());
/// assert!(!engine.insert(b"apple\0\0\0", b"blue").unwrap());
///
/// let mut out = [0u8; 4];
/// assert!(engine.find(b"apple\0\0\0", &mut out).unwrap());
/// assert_eq!(&out, b"red!");
/// engine.close().unwrap();
/// ```
pub struct Engine {
    location: Location,
    geometry: Geometry,
    options: Options,
    pages: PageCache,
    pat: PageAllocationTable,
    tree: BPlusTree,
    /// Inserts since the last commit.
    dirty: bool,
}

impl Engine {
    /// Open or create a store.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` for `OpenExisting` on `Location::Memory`
    /// - `Error::InvalidGeometry` for an unusable requested geometry
    /// - `Error::GeometryMismatch` when `CreateOrOpen` finds a store with a
    ///   different geometry
    /// - `Error::CorruptHeader` / `CorruptPage` / `ChecksumMismatch` for a
    ///   damaged store
    pub fn open(location: Location, mode: OpenMode, options: Options) -> Result<Self> {
        match (location, mode) {
            (Location::Memory, OpenMode::OpenExisting) => Err(Error::InvalidConfig(
                "an in-memory store has nothing to open".into(),
            )),
            (Location::Memory, OpenMode::Create(geometry) | OpenMode::CreateOrOpen(geometry)) => {
                geometry.validate()?;
                Self::create(
                    PageManager::memory(geometry.page_size),
                    Location::Memory,
                    geometry,
                    options,
                )
            }
            (Location::Path(path), OpenMode::Create(geometry)) => {
                geometry.validate()?;
                let manager = PageManager::create_file(&path, geometry.page_size)?;
                Self::create(manager, Location::Path(path), geometry, options)
            }
            (Location::Path(path), OpenMode::CreateOrOpen(geometry)) => {
                geometry.validate()?;
                if store_exists(&path)? {
                    Self::load(path, Some(&geometry), options)
                } else {
                    let manager = PageManager::create_file(&path, geometry.page_size)?;
                    Self::create(manager, Location::Path(path), geometry, options)
                }
            }
            (Location::Path(path), OpenMode::OpenExisting) => Self::load(path, None, options),
        }
    }

    /// New in-memory store.
    pub fn create_memory(geometry: Geometry, options: Options) -> Result<Self> {
        Self::open(Location::Memory, OpenMode::Create(geometry), options)
    }

    /// Open the file at `path`, creating it if it does not exist.
    pub fn create_or_open(path: impl Into<PathBuf>, geometry: Geometry, options: Options) -> Result<Self> {
        Self::open(Location::path(path), OpenMode::CreateOrOpen(geometry), options)
    }

    /// Open an existing file store.
    pub fn open_existing(path: impl Into<PathBuf>, options: Options) -> Result<Self> {
        Self::open(Location::path(path), OpenMode::OpenExisting, options)
    }

    fn create(manager: PageManager, location: Location, geometry: Geometry, options: Options) -> Result<Self> {
        let mut pages = PageCache::new(manager, options.enable_cache, options.cache_capacity);
        let mut pat = PageAllocationTable::new(
            PatLayout::from_large_pat(geometry.large_pat),
            geometry.page_bytes(),
        );
        let tree = BPlusTree::create(geometry, &mut pages, &mut pat, strategy_for(options.balance))?;

        let mut engine = Self {
            location,
            geometry,
            options,
            pages,
            pat,
            tree,
            dirty: true,
        };
        engine.commit()?;

        tracing::debug!(
            target: "plustree::engine",
            location = ?engine.location,
            key_bytes = geometry.key_bytes,
            data_bytes = geometry.data_bytes,
            page_size = geometry.page_size,
            large_pat = geometry.large_pat,
            "created store"
        );
        Ok(engine)
    }

    fn load(path: PathBuf, expected: Option<&Geometry>, options: Options) -> Result<Self> {
        let mut manager = PageManager::open_file(&path)?;
        let header = FileHeader::from_page(&manager.read_page(HEADER_PAGE_ID)?)?;
        if let Some(expected) = expected {
            header.validate_geometry(expected)?;
        }
        let geometry = header.geometry();

        let mut pat = PageAllocationTable::load(
            PatLayout::from_large_pat(header.large_pat),
            geometry.page_bytes(),
            header.pat_location,
            header.pat_page_count,
            |page_id| manager.read_page(page_id),
        )?;
        if !pat.is_used(header.root_page_id) {
            return Err(Error::CorruptHeader(format!(
                "root {} is not allocated",
                header.root_page_id
            )));
        }

        let mut pages = PageCache::new(manager, options.enable_cache, options.cache_capacity);
        let root = pages.read_page(header.root_page_id)?;
        Node::decode(&root, header.root_page_id, &geometry)?;

        let tree = BPlusTree::open(
            geometry,
            header.root_page_id,
            header.tree_height,
            header.record_count,
            strategy_for(options.balance),
        )
        .with_tail_splits(header.tail_splits);

        // Pages replaced by the last commit, and any written by a commit or
        // write-through session that never reached its header, are still
        // marked used on disk.
        if pat.used_count() != header.live_pages {
            let reachable = tree.reachable_pages(&mut pages)?;
            let reclaimed = pat.reclaim_unreachable(&reachable)?;
            tracing::debug!(
                target: "plustree::engine",
                path = %path.display(),
                reclaimed,
                "released pages the committed tree does not reference"
            );
        }

        tracing::debug!(
            target: "plustree::engine",
            path = %path.display(),
            records = header.record_count,
            height = header.tree_height,
            pat_pages = header.pat_page_count,
            "opened store"
        );

        Ok(Self {
            location: Location::Path(path),
            geometry,
            options,
            pages,
            pat,
            tree,
            dirty: false,
        })
    }

    /// Insert `key -> data`.
    ///
    /// Returns `Ok(false)` without changing anything if `key` is already
    /// present; the stored record keeps its original value.
    ///
    /// # Errors
    /// - `Error::KeyLength` / `Error::DataLength` for wrongly sized buffers
    /// - `Error::StoreFull` when no page is left for a split
    pub fn insert(&mut self, key: &[u8], data: &[u8]) -> Result<bool> {
        self.check_key(key)?;
        if data.len() != self.geometry.data_bytes {
            return Err(Error::DataLength {
                expected: self.geometry.data_bytes,
                actual: data.len(),
            });
        }

        let inserted = self.tree.insert(&mut self.pages, &mut self.pat, key, data)?;
        if inserted {
            self.dirty = true;
            if !self.pages.is_enabled() && self.pat.is_dirty() {
                for (page_id, page) in self.pat.dirty_pages() {
                    self.pages.write_page(page_id, page)?;
                }
                self.pat.mark_clean();
            }
        }
        Ok(inserted)
    }

    /// Copy the record stored under `key` into `out`.
    ///
    /// Returns `Ok(false)` and leaves `out` untouched if the key is absent.
    pub fn find(&mut self, key: &[u8], out: &mut [u8]) -> Result<bool> {
        if out.len() != self.geometry.data_bytes {
            return Err(Error::DataLength {
                expected: self.geometry.data_bytes,
                actual: out.len(),
            });
        }
        match self.get(key)? {
            Some(data) => {
                out.copy_from_slice(&data);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The record stored under `key`, if any.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_key(key)?;
        self.tree.search(&mut self.pages, key)
    }

    pub fn contains(&mut self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Make every insert so far durable.
    ///
    /// Tree pages are flushed first, then the changed allocation table
    /// pages, then the file header. None of the tree pages overwrites a page
    /// of the previous commit, so until the header lands the store still
    /// opens to its last committed state. On error the session state is
    /// kept and the commit may be retried.
    ///
    /// Pages the new tree replaced are freed once the header is written.
    pub fn commit(&mut self) -> Result<()> {
        let header = self.header().to_page(self.geometry.page_bytes());
        self.pages.commit(self.pat.dirty_pages(), header)?;
        self.pat.mark_clean();
        self.dirty = false;
        let released = self.tree.release_superseded(&mut self.pat)?;

        tracing::debug!(
            target: "plustree::engine",
            records = self.tree.len(),
            height = self.tree.height(),
            root = self.tree.root().0,
            released,
            "committed"
        );
        Ok(())
    }

    /// Commit if needed and release the store.
    pub fn close(mut self) -> Result<()> {
        if self.dirty {
            self.commit()?;
        }
        tracing::debug!(target: "plustree::engine", location = ?self.location, "closed store");
        Ok(())
    }

    /// Verify the tree structure and allocation table.
    pub fn check_integrity(&mut self) -> Result<IntegrityReport> {
        self.tree.check_integrity(&mut self.pages, &self.pat)
    }

    /// Records stored, committed or not.
    pub fn len(&self) -> u64 {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Tree levels; 1 while the root is a leaf.
    pub fn height(&self) -> u32 {
        self.tree.height()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Whether there are inserts not yet committed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn cache_stats(&self) -> StatsSnapshot {
        self.pages.stats().snapshot()
    }

    /// Pages in the allocation table chain.
    pub fn pat_page_count(&self) -> u32 {
        self.pat.pat_pages().len() as u32
    }

    /// Pages currently allocated, metadata included.
    pub fn allocated_pages(&self) -> u32 {
        self.pat.used_count()
    }

    fn header(&self) -> FileHeader {
        FileHeader {
            root_page_id: self.tree.root(),
            pat_page_count: self.pat.pat_pages().len() as u32,
            tree_height: self.tree.height(),
            record_count: self.tree.len(),
            tail_splits: self.tree.tail_splits(),
            live_pages: self.pat.used_count() - self.tree.superseded().len() as u32,
            ..FileHeader::new(
                &self.geometry,
                self.tree.root(),
                FIRST_PAT_PAGE_ID,
                self.options.enable_cache,
                self.options.balance,
            )
        }
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.geometry.key_bytes {
            return Err(Error::KeyLength {
                expected: self.geometry.key_bytes,
                actual: key.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("location", &self.location)
            .field("geometry", &self.geometry)
            .field("options", &self.options)
            .field("records", &self.tree.len())
            .field("height", &self.tree.height())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.dirty {
            tracing::warn!(
                target: "plustree::engine",
                location = ?self.location,
                records = self.tree.len(),
                "engine dropped with uncommitted inserts; discarding them"
            );
        }
    }
}

/// A path names an existing store if it is a non-empty file.
fn store_exists(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.len() > 0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
