//! Whole-tree structural verification.

use std::collections::HashSet;
use std::fmt;

use super::node::Node;
use super::strategy::{Append, Balanced, InsertStrategy};
use super::BPlusTree;
use crate::allocation::PageAllocationTable;
use crate::buffer::PageCache;
use crate::common::config::HEADER_PAGE_ID;
use crate::common::{Error, PageId, Result};

/// Shape of a tree that passed [`BPlusTree::check_integrity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntegrityReport {
    pub height: u32,
    pub leaf_pages: u32,
    pub internal_pages: u32,
    pub records: u64,
    /// Tree pages reached from the root.
    pub reachable_pages: u32,
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "height {}, {} records in {} leaves and {} internal nodes",
            self.height, self.records, self.leaf_pages, self.internal_pages
        )
    }
}

fn violation(message: String) -> Error {
    Error::IntegrityViolation(message)
}

struct Walker<'a> {
    tree: &'a BPlusTree,
    pages: &'a mut PageCache,
    pat: &'a PageAllocationTable,
    seen: HashSet<PageId>,
    report: IntegrityReport,
}

impl Walker<'_> {
    /// Visit `page_id` at `depth` (root = 1). Every key must lie in
    /// `[low, high)`.
    fn visit(
        &mut self,
        page_id: PageId,
        depth: u32,
        low: Option<&[u8]>,
        high: Option<&[u8]>,
    ) -> Result<()> {
        if !self.seen.insert(page_id) {
            return Err(violation(format!("{} is referenced twice", page_id)));
        }
        if !self.pat.is_used(page_id) {
            return Err(violation(format!("{} is reachable but marked free", page_id)));
        }

        let node = self.tree.read_node(self.pages, page_id)?;
        let keys = match &node {
            Node::Leaf(leaf) => &leaf.keys,
            Node::Internal(internal) => &internal.keys,
        };

        if let Some(pair) = keys.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(violation(format!(
                "{} keys out of order: {:02x?} before {:02x?}",
                page_id, pair[0], pair[1]
            )));
        }
        if let (Some(low), Some(first)) = (low, keys.first()) {
            if first.as_slice() < low {
                return Err(violation(format!("{} has a key below its separator", page_id)));
            }
        }
        if let (Some(high), Some(last)) = (high, keys.last()) {
            if last.as_slice() >= high {
                return Err(violation(format!("{} has a key at or above the next separator", page_id)));
            }
        }

        let is_root = depth == 1;
        // Occupancy follows the tree's history, not the session's policy.
        let bounds: &dyn InsertStrategy = if self.tree.tail_splits() {
            &Append
        } else {
            &Balanced
        };
        let geometry = self.tree.geometry();

        match node {
            Node::Leaf(leaf) => {
                if depth != self.tree.height() {
                    return Err(violation(format!(
                        "leaf {} at depth {}, tree height is {}",
                        page_id,
                        depth,
                        self.tree.height()
                    )));
                }
                let min = bounds.min_leaf_keys(geometry.leaf_capacity());
                if !is_root && leaf.len() < min {
                    return Err(violation(format!(
                        "leaf {} holds {} records, minimum is {}",
                        page_id,
                        leaf.len(),
                        min
                    )));
                }
                self.report.leaf_pages += 1;
                self.report.records += leaf.len() as u64;
            }
            Node::Internal(internal) => {
                if depth >= self.tree.height() {
                    return Err(violation(format!(
                        "internal node {} at leaf depth {}",
                        page_id, depth
                    )));
                }
                if internal.children.len() != internal.keys.len() + 1 {
                    return Err(violation(format!(
                        "{} has {} keys but {} children",
                        page_id,
                        internal.keys.len(),
                        internal.children.len()
                    )));
                }
                let min = if is_root {
                    1
                } else {
                    bounds.min_internal_keys(geometry.internal_capacity())
                };
                if internal.len() < min {
                    return Err(violation(format!(
                        "internal node {} holds {} keys, minimum is {}",
                        page_id,
                        internal.len(),
                        min
                    )));
                }
                self.report.internal_pages += 1;

                for (i, &child) in internal.children.iter().enumerate() {
                    let child_low = if i == 0 {
                        low
                    } else {
                        Some(internal.keys[i - 1].as_slice())
                    };
                    let child_high = internal.keys.get(i).map(Vec::as_slice).or(high);
                    self.visit(child, depth + 1, child_low, child_high)?;
                }
            }
        }
        Ok(())
    }
}

/// Walk every node reachable from the root and cross-check the allocation
/// table. Pages superseded since the last commit are still allocated and
/// do not count as leaks.
pub(super) fn check(
    tree: &BPlusTree,
    pages: &mut PageCache,
    pat: &PageAllocationTable,
) -> Result<IntegrityReport> {
    let mut walker = Walker {
        tree,
        pages,
        pat,
        seen: HashSet::new(),
        report: IntegrityReport {
            height: tree.height(),
            ..IntegrityReport::default()
        },
    };
    walker.visit(tree.root(), 1, None, None)?;

    if walker.report.records != tree.len() {
        return Err(violation(format!(
            "tree holds {} records, header says {}",
            walker.report.records,
            tree.len()
        )));
    }

    let superseded: HashSet<PageId> = tree.superseded().iter().copied().collect();
    let leaked = pat.iter_used().find(|page_id| {
        *page_id != HEADER_PAGE_ID
            && !pat.pat_pages().contains(page_id)
            && !walker.seen.contains(page_id)
            && !superseded.contains(page_id)
    });
    if let Some(page_id) = leaked {
        return Err(violation(format!("{} is marked used but unreachable", page_id)));
    }

    walker.report.reachable_pages = walker.seen.len() as u32;
    Ok(walker.report)
}
