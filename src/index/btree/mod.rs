//! B+Tree index over fixed-length keys and records.
//!
//! Records live only in leaves; internal nodes hold separator keys and
//! child page ids. All pages go through the [`PageCache`] and are allocated
//! from the [`PageAllocationTable`], both owned by the engine and lent to
//! the tree per call.
//!
//! Pages that belong to the last committed tree are never overwritten. The
//! first change to such a node in a commit cycle writes it to a new page and
//! re-points its parent, up to the root. The replaced pages stay allocated
//! until the commit that stops referencing them has written its header.
//!
//! # Components
//! - [`BPlusTree`] - root, height and record count; search and insert
//! - [`Node`] - page encoding of leaves and internal nodes
//! - [`InsertStrategy`] - where nodes split ([`Balanced`] or [`Append`])
//! - [`IntegrityReport`] - result of a full structural check

mod integrity;
mod node;
mod strategy;

pub use integrity::IntegrityReport;
pub use node::{InternalNode, LeafNode, Node};
pub use strategy::{strategy_for, Append, Balanced, InsertStrategy};

use std::collections::HashSet;

use crate::allocation::PageAllocationTable;
use crate::buffer::PageCache;
use crate::common::{Error, Geometry, PageId, Result};

/// A descent step: the internal node visited and the child slot taken.
type PathEntry = (PageId, InternalNode, usize);

/// How a rewritten node shows up in its parent.
#[derive(Debug)]
enum Update {
    /// Overwritten where it was.
    InPlace,
    /// Copied to a new page.
    Moved(PageId),
    /// Split in two; `left` is where the left half now lives.
    Split {
        left: PageId,
        separator: Vec<u8>,
        right: PageId,
    },
}

impl Update {
    fn relocated(from: PageId, to: PageId) -> Self {
        if from == to {
            Update::InPlace
        } else {
            Update::Moved(to)
        }
    }
}

/// Handle to one tree inside a store.
///
/// Root id, height, record count and the tail-split flag are what the engine
/// persists in the file header at commit. Between commits the tree also
/// remembers which pages it allocated and which committed pages it
/// replaced.
///
/// # Example
/// ```
/// use plustree::allocation::{PageAllocationTable, PatLayout};
/// use plustree::buffer::PageCache;
/// use plustree::index::btree::{strategy_for, BPlusTree};
/// use plustree::storage::PageManager;
/// use plustree::Geometry;
///
/// let geometry = Geometry::new(4, 8, 1);
/// let mut pages = PageCache::new(PageManager::memory(1), true, 16);
/// let mut pat = PageAllocationTable::new(PatLayout::Compact, geometry.page_bytes());
/// let mut tree = BPlusTree::create(geometry, &mut pages, &mut pat, strategy_for(true)).unwrap();
///
/// assert!(tree.insert(&mut pages, &mut pat, b"key1", b"value001").unwrap());
/// assert_eq!(tree.search(&mut pages, b"key1").unwrap(), Some(b"value001".to_vec()));
/// ```
#[derive(Debug)]
pub struct BPlusTree {
    geometry: Geometry,
    root: PageId,
    height: u32,
    len: u64,
    strategy: Box<dyn InsertStrategy>,
    /// Some committed or pending node was split by a policy that does not
    /// keep nodes half full.
    tail_splits: bool,
    /// Pages allocated since the last commit; only these are overwritten.
    fresh: HashSet<PageId>,
    /// Committed pages replaced by copies since the last commit.
    superseded: Vec<PageId>,
}

impl BPlusTree {
    /// Allocate and write an empty root leaf.
    pub fn create(
        geometry: Geometry,
        pages: &mut PageCache,
        pat: &mut PageAllocationTable,
        strategy: Box<dyn InsertStrategy>,
    ) -> Result<Self> {
        let mut tree = Self::open(geometry, PageId::INVALID, 1, 0, strategy);
        tree.root = tree.allocate(pat)?;
        tree.write_node(pages, tree.root, &Node::Leaf(LeafNode::default()))?;

        tracing::debug!(
            target: "plustree::btree",
            root = tree.root.0,
            strategy = tree.strategy.name(),
            "created empty tree"
        );
        Ok(tree)
    }

    /// Attach to an existing tree described by a file header.
    pub fn open(
        geometry: Geometry,
        root: PageId,
        height: u32,
        len: u64,
        strategy: Box<dyn InsertStrategy>,
    ) -> Self {
        Self {
            geometry,
            root,
            height,
            len,
            strategy,
            tail_splits: false,
            fresh: HashSet::new(),
            superseded: Vec::new(),
        }
    }

    /// Carry over the tail-split flag recorded with the tree.
    pub fn with_tail_splits(mut self, tail_splits: bool) -> Self {
        self.tail_splits = tail_splits;
        self
    }

    #[inline]
    pub fn root(&self) -> PageId {
        self.root
    }

    /// Levels from root to leaf; a lone root leaf is height 1.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Records stored.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn strategy(&self) -> &dyn InsertStrategy {
        self.strategy.as_ref()
    }

    /// Whether nodes may be below half full because the append policy split
    /// them.
    pub fn tail_splits(&self) -> bool {
        self.tail_splits
    }

    /// Committed pages the tree no longer references. They stay allocated
    /// until [`release_superseded`](Self::release_superseded).
    pub fn superseded(&self) -> &[PageId] {
        &self.superseded
    }

    /// Find the record stored under `key`.
    pub fn search(&self, pages: &mut PageCache, key: &[u8]) -> Result<Option<Vec<u8>>> {
        debug_assert_eq!(key.len(), self.geometry.key_bytes);

        let mut page_id = self.root;
        let mut depth = 1;
        loop {
            match self.read_node(pages, page_id)? {
                Node::Leaf(mut leaf) => {
                    return Ok(leaf.search(key).ok().map(|slot| leaf.values.swap_remove(slot)));
                }
                Node::Internal(node) => {
                    if depth >= self.height {
                        return Err(Error::corrupt(page_id, "internal node at leaf depth"));
                    }
                    page_id = node.children[node.child_index(key)];
                    depth += 1;
                }
            }
        }
    }

    /// Insert `key -> data`.
    ///
    /// Returns `Ok(false)` and changes nothing if the key is already
    /// present.
    ///
    /// # Errors
    /// `Error::StoreFull` if the copies and splits this insert needs cannot
    /// be allocated. The check happens before any page is written, so the
    /// tree is left exactly as it was.
    pub fn insert(
        &mut self,
        pages: &mut PageCache,
        pat: &mut PageAllocationTable,
        key: &[u8],
        data: &[u8],
    ) -> Result<bool> {
        debug_assert_eq!(key.len(), self.geometry.key_bytes);
        debug_assert_eq!(data.len(), self.geometry.data_bytes);

        let mut path: Vec<PathEntry> = Vec::with_capacity(self.height as usize);
        let mut page_id = self.root;
        let mut leaf = loop {
            match self.read_node(pages, page_id)? {
                Node::Leaf(leaf) => break leaf,
                Node::Internal(node) => {
                    if path.len() as u32 + 1 >= self.height {
                        return Err(Error::corrupt(page_id, "internal node at leaf depth"));
                    }
                    let slot = node.child_index(key);
                    let child = node.children[slot];
                    path.push((page_id, node, slot));
                    page_id = child;
                }
            }
        };

        let slot = match leaf.search(key) {
            Ok(_) => return Ok(false),
            Err(slot) => slot,
        };

        let overflows = leaf.len() >= self.geometry.leaf_capacity();
        let needed = self.pages_needed(&path, page_id, overflows);
        if !pat.can_allocate(needed) {
            return Err(Error::StoreFull {
                capacity: pat.capacity(),
            });
        }

        leaf.insert(slot, key.to_vec(), data.to_vec());
        let update = if overflows {
            let at = self.strategy.leaf_split_point(leaf.len());
            let right = leaf.split_off(at);
            let separator = right.keys[0].clone();
            let right_id = self.allocate(pat)?;
            self.write_node(pages, right_id, &Node::Leaf(right))?;
            let left_id = self.place(pages, pat, page_id, &Node::Leaf(leaf))?;
            self.note_split();
            tracing::trace!(
                target: "plustree::btree",
                left = left_id.0,
                right = right_id.0,
                at,
                "split leaf"
            );
            Update::Split {
                left: left_id,
                separator,
                right: right_id,
            }
        } else {
            let placed = self.place(pages, pat, page_id, &Node::Leaf(leaf))?;
            Update::relocated(page_id, placed)
        };

        self.propagate(pages, pat, path, update)?;
        self.len += 1;
        Ok(true)
    }

    /// Check every structural invariant of the tree against the pages and
    /// the allocation table.
    ///
    /// # Errors
    /// `Error::IntegrityViolation` naming the first problem found, or the
    /// error from reading a bad page.
    pub fn check_integrity(
        &self,
        pages: &mut PageCache,
        pat: &PageAllocationTable,
    ) -> Result<IntegrityReport> {
        integrity::check(self, pages, pat)
    }

    /// Every page the tree references. Only internal nodes are read; leaf
    /// ids come from their parents.
    ///
    /// # Errors
    /// `Error::CorruptPage` if a page is referenced twice or a leaf sits
    /// above leaf depth.
    pub fn reachable_pages(&self, pages: &mut PageCache) -> Result<HashSet<PageId>> {
        let mut reachable = HashSet::from([self.root]);
        let mut level = vec![self.root];
        for _ in 1..self.height {
            let mut below = Vec::new();
            for page_id in level {
                let node = match self.read_node(pages, page_id)? {
                    Node::Internal(node) => node,
                    Node::Leaf(_) => return Err(Error::corrupt(page_id, "leaf above leaf depth")),
                };
                for child in node.children {
                    if !reachable.insert(child) {
                        return Err(Error::corrupt(child, "page referenced twice"));
                    }
                    below.push(child);
                }
            }
            level = below;
        }
        Ok(reachable)
    }

    /// End the commit cycle once its header is durable. Superseded pages
    /// are freed, and every page written so far becomes committed.
    ///
    /// Returns how many pages were freed.
    pub fn release_superseded(&mut self, pat: &mut PageAllocationTable) -> Result<usize> {
        let superseded = std::mem::take(&mut self.superseded);
        for &page_id in &superseded {
            pat.free(page_id)?;
        }
        self.fresh.clear();
        Ok(superseded.len())
    }

    /// Apply `update` to each parent on `path`, copying or splitting them as
    /// needed, and grow a new root when the old root splits.
    fn propagate(
        &mut self,
        pages: &mut PageCache,
        pat: &mut PageAllocationTable,
        mut path: Vec<PathEntry>,
        mut update: Update,
    ) -> Result<()> {
        let capacity = self.geometry.internal_capacity();

        while let Some((parent_id, mut parent, slot)) = path.pop() {
            match update {
                Update::InPlace => return Ok(()),
                Update::Moved(child) => parent.children[slot] = child,
                Update::Split {
                    left,
                    separator,
                    right,
                } => {
                    parent.children[slot] = left;
                    parent.insert_child(slot, separator, right);
                }
            }

            if parent.len() <= capacity {
                let placed = self.place(pages, pat, parent_id, &Node::Internal(parent))?;
                update = Update::relocated(parent_id, placed);
                continue;
            }

            let at = self.strategy.internal_split_point(parent.len());
            let (promoted, sibling) = parent.split_at(at);
            let sibling_id = self.allocate(pat)?;
            self.write_node(pages, sibling_id, &Node::Internal(sibling))?;
            let left_id = self.place(pages, pat, parent_id, &Node::Internal(parent))?;
            self.note_split();
            tracing::trace!(
                target: "plustree::btree",
                left = left_id.0,
                right = sibling_id.0,
                at,
                "split internal node"
            );
            update = Update::Split {
                left: left_id,
                separator: promoted,
                right: sibling_id,
            };
        }

        match update {
            Update::InPlace => {}
            Update::Moved(root) => self.root = root,
            Update::Split {
                left,
                separator,
                right,
            } => {
                let new_root = self.allocate(pat)?;
                let root = InternalNode::new_root(separator, left, right);
                self.write_node(pages, new_root, &Node::Internal(root))?;
                self.root = new_root;
                self.height += 1;

                tracing::trace!(
                    target: "plustree::btree",
                    root = new_root.0,
                    height = self.height,
                    "promoted new root"
                );
            }
        }
        Ok(())
    }

    /// Pages an insert will allocate: a copy of every committed node it
    /// changes, the right half of every split, and a new root if the root
    /// splits. Mirrors what [`propagate`](Self::propagate) does.
    fn pages_needed(&self, path: &[PathEntry], leaf_id: PageId, leaf_overflows: bool) -> u32 {
        let capacity = self.geometry.internal_capacity();
        let copied = |page_id: PageId| !self.fresh.contains(&page_id);

        let mut moved = copied(leaf_id);
        let mut grows = leaf_overflows;
        let mut needed = u32::from(moved) + u32::from(grows);
        for (page_id, node, _) in path.iter().rev() {
            if !moved && !grows {
                return needed;
            }
            let splits = grows && node.len() >= capacity;
            moved = copied(*page_id);
            needed += u32::from(moved) + u32::from(splits);
            grows = splits;
        }
        needed + u32::from(grows)
    }

    /// Write `node` as the new contents of `page_id`. A page allocated in
    /// this cycle is overwritten; a committed one is left intact and the
    /// node goes to a fresh page. Returns where the node was written.
    fn place(
        &mut self,
        pages: &mut PageCache,
        pat: &mut PageAllocationTable,
        page_id: PageId,
        node: &Node,
    ) -> Result<PageId> {
        let target = if self.fresh.contains(&page_id) {
            page_id
        } else {
            let copy = self.allocate(pat)?;
            self.superseded.push(page_id);
            copy
        };
        self.write_node(pages, target, node)?;
        Ok(target)
    }

    fn allocate(&mut self, pat: &mut PageAllocationTable) -> Result<PageId> {
        let page_id = pat.allocate()?;
        self.fresh.insert(page_id);
        Ok(page_id)
    }

    fn note_split(&mut self) {
        if !self.strategy.keeps_half_full() {
            self.tail_splits = true;
        }
    }

    fn read_node(&self, pages: &mut PageCache, page_id: PageId) -> Result<Node> {
        let page = pages.read_page(page_id)?;
        Node::decode(&page, page_id, &self.geometry)
    }

    fn write_node(&self, pages: &mut PageCache, page_id: PageId, node: &Node) -> Result<()> {
        let page = node.encode(page_id, &self.geometry)?;
        pages.write_page(page_id, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::PatLayout;
    use crate::storage::PageManager;

    /// 3 records per leaf, 4 separators per internal node.
    fn narrow() -> Geometry {
        Geometry::new(100, 60, 1)
    }

    fn key(g: &Geometry, n: u32) -> Vec<u8> {
        let mut key = vec![0u8; g.key_bytes];
        key[g.key_bytes - 4..].copy_from_slice(&n.to_be_bytes());
        key
    }

    fn value(g: &Geometry, n: u32) -> Vec<u8> {
        let mut value = vec![0u8; g.data_bytes];
        value[..4].copy_from_slice(&n.to_le_bytes());
        value
    }

    fn setup(g: Geometry, balance: bool) -> (BPlusTree, PageCache, PageAllocationTable) {
        let mut pages = PageCache::new(PageManager::memory(g.page_size), true, 32);
        let mut pat = PageAllocationTable::new(PatLayout::Compact, g.page_bytes());
        let tree = BPlusTree::create(g, &mut pages, &mut pat, strategy_for(balance)).unwrap();
        (tree, pages, pat)
    }

    fn insert_all(
        tree: &mut BPlusTree,
        pages: &mut PageCache,
        pat: &mut PageAllocationTable,
        keys: impl IntoIterator<Item = u32>,
    ) {
        let g = *tree.geometry();
        for n in keys {
            assert!(tree.insert(pages, pat, &key(&g, n), &value(&g, n)).unwrap(), "key {}", n);
        }
    }

    #[test]
    fn test_capacities_of_test_geometry() {
        let g = narrow();
        assert_eq!(g.leaf_capacity(), 3);
        assert_eq!(g.internal_capacity(), 4);
    }

    #[test]
    fn test_empty_tree() {
        let g = narrow();
        let (tree, mut pages, pat) = setup(g, true);
        assert_eq!(tree.root(), PageId(2));
        assert_eq!(tree.height(), 1);
        assert!(tree.is_empty());
        assert_eq!(tree.search(&mut pages, &key(&g, 1)).unwrap(), None);

        let report = tree.check_integrity(&mut pages, &pat).unwrap();
        assert_eq!(report.leaf_pages, 1);
        assert_eq!(report.records, 0);
    }

    #[test]
    fn test_insert_and_search() {
        let g = narrow();
        let (mut tree, mut pages, mut pat) = setup(g, true);
        insert_all(&mut tree, &mut pages, &mut pat, [30, 10, 20]);

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.height(), 1);
        for n in [10, 20, 30] {
            assert_eq!(tree.search(&mut pages, &key(&g, n)).unwrap(), Some(value(&g, n)));
        }
        assert_eq!(tree.search(&mut pages, &key(&g, 15)).unwrap(), None);
    }

    #[test]
    fn test_duplicate_keeps_first_value() {
        let g = narrow();
        let (mut tree, mut pages, mut pat) = setup(g, true);
        insert_all(&mut tree, &mut pages, &mut pat, [7]);

        let inserted = tree
            .insert(&mut pages, &mut pat, &key(&g, 7), &value(&g, 999))
            .unwrap();
        assert!(!inserted);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.search(&mut pages, &key(&g, 7)).unwrap(), Some(value(&g, 7)));
    }

    #[test]
    fn test_root_split() {
        let g = narrow();
        let (mut tree, mut pages, mut pat) = setup(g, true);
        insert_all(&mut tree, &mut pages, &mut pat, 1..=4);

        assert_eq!(tree.height(), 2);
        assert_ne!(tree.root(), PageId(2));

        match tree.read_node(&mut pages, tree.root()).unwrap() {
            Node::Internal(root) => {
                assert_eq!(root.keys, vec![key(&g, 3)]);
                assert_eq!(root.children[0], PageId(2));
            }
            Node::Leaf(_) => panic!("root should be internal after a split"),
        }
        tree.check_integrity(&mut pages, &pat).unwrap();
    }

    #[test]
    fn test_balanced_orders() {
        let g = narrow();
        let ascending: Vec<u32> = (0..300).collect();
        let descending: Vec<u32> = (0..300).rev().collect();
        let scattered: Vec<u32> = (0..300).map(|i| (i * 7919) % 300).collect();

        for keys in [ascending, descending, scattered] {
            let (mut tree, mut pages, mut pat) = setup(g, true);
            insert_all(&mut tree, &mut pages, &mut pat, keys.iter().copied());

            let report = tree.check_integrity(&mut pages, &pat).unwrap();
            assert_eq!(report.records, 300);
            assert!(tree.height() >= 4);
            for &n in &keys {
                assert_eq!(tree.search(&mut pages, &key(&g, n)).unwrap(), Some(value(&g, n)));
            }
            assert_eq!(tree.search(&mut pages, &key(&g, 300)).unwrap(), None);
        }
    }

    #[test]
    fn test_append_packs_ascending_leaves() {
        let g = narrow();
        let (mut tree, mut pages, mut pat) = setup(g, false);
        insert_all(&mut tree, &mut pages, &mut pat, 0..100);

        let report = tree.check_integrity(&mut pages, &pat).unwrap();
        assert_eq!(report.records, 100);
        assert_eq!(report.leaf_pages as usize, 100usize.div_ceil(g.leaf_capacity()));
        for n in 0..100 {
            assert!(tree.search(&mut pages, &key(&g, n)).unwrap().is_some());
        }
    }

    #[test]
    fn test_append_random_order_stays_searchable() {
        let g = narrow();
        let (mut tree, mut pages, mut pat) = setup(g, false);
        let keys: Vec<u32> = (0..200).map(|i| (i * 37) % 200).collect();
        insert_all(&mut tree, &mut pages, &mut pat, keys.iter().copied());

        tree.check_integrity(&mut pages, &pat).unwrap();
        for n in keys {
            assert_eq!(tree.search(&mut pages, &key(&g, n)).unwrap(), Some(value(&g, n)));
        }
    }

    #[test]
    fn test_store_full_leaves_tree_untouched() {
        let g = narrow();
        let (mut tree, mut pages, mut pat) = setup(g, true);
        insert_all(&mut tree, &mut pages, &mut pat, 1..=3);

        // Exhaust the allocation table behind the tree's back.
        while pat.can_allocate(1) {
            pat.allocate().unwrap();
        }

        let result = tree.insert(&mut pages, &mut pat, &key(&g, 4), &value(&g, 4));
        assert!(matches!(result, Err(Error::StoreFull { .. })));
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.search(&mut pages, &key(&g, 4)).unwrap(), None);
        for n in 1..=3 {
            assert!(tree.search(&mut pages, &key(&g, n)).unwrap().is_some());
        }
    }

    #[test]
    fn test_integrity_detects_leak() {
        let g = narrow();
        let (mut tree, mut pages, mut pat) = setup(g, true);
        insert_all(&mut tree, &mut pages, &mut pat, 1..=10);
        pat.allocate().unwrap();

        assert!(matches!(
            tree.check_integrity(&mut pages, &pat),
            Err(Error::IntegrityViolation(_))
        ));
    }

    #[test]
    fn test_integrity_detects_count_mismatch() {
        let g = narrow();
        let (tree, mut pages, pat) = setup(g, true);
        let stale = BPlusTree::open(g, tree.root(), 1, 5, strategy_for(true));

        assert!(matches!(
            stale.check_integrity(&mut pages, &pat),
            Err(Error::IntegrityViolation(_))
        ));
    }

    #[test]
    fn test_reopen_from_root() {
        let g = narrow();
        let (mut tree, mut pages, mut pat) = setup(g, true);
        insert_all(&mut tree, &mut pages, &mut pat, 0..50);

        let reopened = BPlusTree::open(g, tree.root(), tree.height(), tree.len(), strategy_for(true));
        reopened.check_integrity(&mut pages, &pat).unwrap();
        assert_eq!(reopened.search(&mut pages, &key(&g, 42)).unwrap(), Some(value(&g, 42)));
    }
    /// Snapshot of every page a tree references.
    fn page_images(tree: &BPlusTree, pages: &mut PageCache) -> Vec<(PageId, Vec<u8>)> {
        let mut ids: Vec<PageId> = tree.reachable_pages(pages).unwrap().into_iter().collect();
        ids.sort();
        ids.into_iter()
            .map(|id| (id, pages.read_page(id).unwrap().as_slice().to_vec()))
            .collect()
    }

    #[test]
    fn test_committed_pages_are_never_rewritten() {
        let g = narrow();
        let (mut tree, mut pages, mut pat) = setup(g, true);
        insert_all(&mut tree, &mut pages, &mut pat, (0..40).map(|n| n * 2));
        tree.release_superseded(&mut pat).unwrap();

        let committed = BPlusTree::open(g, tree.root(), tree.height(), tree.len(), strategy_for(true));
        let before = page_images(&committed, &mut pages);

        insert_all(&mut tree, &mut pages, &mut pat, (0..40).map(|n| n * 2 + 1));
        assert_ne!(tree.root(), committed.root());
        assert!(!tree.superseded().is_empty());

        // The committed tree is byte for byte what it was.
        assert_eq!(page_images(&committed, &mut pages), before);
        for n in 0..80 {
            let found = committed.search(&mut pages, &key(&g, n)).unwrap();
            assert_eq!(found.is_some(), n % 2 == 0, "key {}", n);
        }

        let report = tree.check_integrity(&mut pages, &pat).unwrap();
        assert_eq!(report.records, 80);

        let freed = tree.release_superseded(&mut pat).unwrap();
        assert!(freed > 0);
        assert!(tree.superseded().is_empty());
        tree.check_integrity(&mut pages, &pat).unwrap();
    }

    #[test]
    fn test_pages_written_in_one_cycle_are_reused() {
        let g = narrow();
        let (mut tree, mut pages, mut pat) = setup(g, true);
        insert_all(&mut tree, &mut pages, &mut pat, [5]);
        tree.release_superseded(&mut pat).unwrap();

        // First change copies the committed root leaf, later ones overwrite
        // the copy.
        insert_all(&mut tree, &mut pages, &mut pat, [6]);
        let copy = tree.root();
        assert_ne!(copy, PageId(2));
        insert_all(&mut tree, &mut pages, &mut pat, [7]);
        assert_eq!(tree.root(), copy);
        assert_eq!(tree.superseded(), &[PageId(2)]);

        tree.release_superseded(&mut pat).unwrap();
        assert!(!pat.is_used(PageId(2)));
        tree.check_integrity(&mut pages, &pat).unwrap();
    }

    #[test]
    fn test_store_full_counts_copies() {
        let g = narrow();
        let (mut tree, mut pages, mut pat) = setup(g, true);
        insert_all(&mut tree, &mut pages, &mut pat, 0..12);
        tree.release_superseded(&mut pat).unwrap();
        let height = tree.height();
        assert!(height >= 2);

        // Enough for the leaf copy but not for its parents.
        while pat.can_allocate(2) {
            pat.allocate().unwrap();
        }
        let result = tree.insert(&mut pages, &mut pat, &key(&g, 100), &value(&g, 100));
        assert!(matches!(result, Err(Error::StoreFull { .. })));
        assert_eq!(tree.len(), 12);
        assert!(tree.superseded().is_empty());
        assert_eq!(tree.search(&mut pages, &key(&g, 100)).unwrap(), None);
    }

    #[test]
    fn test_tail_splits_flag() {
        let g = narrow();
        let (mut balanced, mut pages, mut pat) = setup(g, true);
        insert_all(&mut balanced, &mut pages, &mut pat, 0..50);
        assert!(!balanced.tail_splits());

        let (mut append, mut pages, mut pat) = setup(g, false);
        insert_all(&mut append, &mut pages, &mut pat, 0..3);
        assert!(!append.tail_splits());
        insert_all(&mut append, &mut pages, &mut pat, 3..4);
        assert!(append.tail_splits());
    }

    #[test]
    fn test_tail_split_tree_checks_under_balanced_session() {
        let g = narrow();
        let (mut tree, mut pages, mut pat) = setup(g, false);
        insert_all(&mut tree, &mut pages, &mut pat, 0..100);

        let reopened = BPlusTree::open(g, tree.root(), tree.height(), tree.len(), strategy_for(true))
            .with_tail_splits(tree.tail_splits());
        reopened.check_integrity(&mut pages, &pat).unwrap();

        let forgetful = BPlusTree::open(g, tree.root(), tree.height(), tree.len(), strategy_for(true));
        assert!(matches!(
            forgetful.check_integrity(&mut pages, &pat),
            Err(Error::IntegrityViolation(_))
        ));
    }

    #[test]
    fn test_reachable_pages_match_integrity_walk() {
        let g = narrow();
        let (mut tree, mut pages, mut pat) = setup(g, true);
        insert_all(&mut tree, &mut pages, &mut pat, (0..120).rev());

        let reachable = tree.reachable_pages(&mut pages).unwrap();
        let report = tree.check_integrity(&mut pages, &pat).unwrap();
        assert_eq!(reachable.len() as u32, report.reachable_pages);
        assert!(reachable.contains(&tree.root()));
        // Header and PAT page are the only other used pages.
        assert_eq!(pat.used_count(), report.reachable_pages + 2);
    }
}
