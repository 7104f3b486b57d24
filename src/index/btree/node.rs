//! Tree nodes and their page encoding.
//!
//! A node occupies exactly one logical page. Nodes refer to their children
//! by [`PageId`]; there is no in-memory object graph.

use crate::common::config::{CHILD_PTR_SIZE, HEADER_PAGE_ID};
use crate::common::{Error, Geometry, PageId, Result};
use crate::storage::page::{Page, PageHeader, PageType};
use crate::storage::{get_u32, put_u32};

/// A decoded tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

/// Sorted keys with one data record per key.
///
/// # Page layout
/// ```text
/// PageHeader (type = BTreeLeaf, count = n)
/// key[0] data[0] key[1] data[1] ... key[n-1] data[n-1]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeafNode {
    pub keys: Vec<Vec<u8>>,
    pub values: Vec<Vec<u8>>,
}

/// Sorted separator keys with `keys.len() + 1` children.
///
/// Separator `i` is the smallest key stored under child `i + 1`, so a key
/// `k` lives under child `partition_point(sep <= k)`.
///
/// # Page layout
/// ```text
/// PageHeader (type = BTreeInternal, count = n)
/// child[0]: u32
/// key[0] child[1] key[1] child[2] ... key[n-1] child[n]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InternalNode {
    pub keys: Vec<Vec<u8>>,
    pub children: Vec<PageId>,
}

impl LeafNode {
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Binary search for `key`: `Ok(slot)` if present, `Err(slot)` where it
    /// would be inserted otherwise.
    pub fn search(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        self.keys.binary_search_by(|probe| probe.as_slice().cmp(key))
    }

    pub fn insert(&mut self, slot: usize, key: Vec<u8>, value: Vec<u8>) {
        self.keys.insert(slot, key);
        self.values.insert(slot, value);
    }

    /// Move entries `at..` into a new right sibling.
    pub fn split_off(&mut self, at: usize) -> LeafNode {
        LeafNode {
            keys: self.keys.split_off(at),
            values: self.values.split_off(at),
        }
    }
}

impl InternalNode {
    /// Root created by splitting the old root into `left` and `right`.
    pub fn new_root(separator: Vec<u8>, left: PageId, right: PageId) -> Self {
        Self {
            keys: vec![separator],
            children: vec![left, right],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Index of the child whose subtree may contain `key`.
    pub fn child_index(&self, key: &[u8]) -> usize {
        self.keys.partition_point(|separator| separator.as_slice() <= key)
    }

    /// Link a new right sibling of child `index`.
    pub fn insert_child(&mut self, index: usize, separator: Vec<u8>, right: PageId) {
        self.keys.insert(index, separator);
        self.children.insert(index + 1, right);
    }

    /// Split around key `at`: keys before it stay, keys after it move to the
    /// returned sibling, and key `at` itself is handed back for promotion.
    pub fn split_at(&mut self, at: usize) -> (Vec<u8>, InternalNode) {
        let right = InternalNode {
            keys: self.keys.split_off(at + 1),
            children: self.children.split_off(at + 1),
        };
        let promoted = self.keys.pop().unwrap_or_default();
        (promoted, right)
    }
}

impl Node {
    /// Number of keys.
    pub fn len(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.len(),
            Node::Internal(internal) => internal.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Encode into a fresh page for `geometry`.
    ///
    /// # Errors
    /// `Error::IntegrityViolation` if the node holds more keys than a page
    /// of this geometry can take; callers split before encoding.
    pub fn encode(&self, page_id: PageId, geometry: &Geometry) -> Result<Page> {
        let (page_type, capacity) = match self {
            Node::Leaf(_) => (PageType::BTreeLeaf, geometry.leaf_capacity()),
            Node::Internal(_) => (PageType::BTreeInternal, geometry.internal_capacity()),
        };
        if self.len() > capacity {
            return Err(Error::IntegrityViolation(format!(
                "{} holds {} keys, page capacity is {}",
                page_id,
                self.len(),
                capacity
            )));
        }

        let mut page = Page::new(geometry.page_bytes());
        page.set_header(&PageHeader {
            count: self.len() as u16,
            ..PageHeader::new(page_type)
        });

        let k = geometry.key_bytes;
        let body = page.body_mut();
        match self {
            Node::Leaf(leaf) => {
                let stride = k + geometry.data_bytes;
                for (i, (key, value)) in leaf.keys.iter().zip(&leaf.values).enumerate() {
                    let at = i * stride;
                    body[at..at + k].copy_from_slice(key);
                    body[at + k..at + stride].copy_from_slice(value);
                }
            }
            Node::Internal(internal) => {
                let stride = k + CHILD_PTR_SIZE;
                put_u32(body, 0, internal.children[0].0);
                for (i, (key, child)) in internal.keys.iter().zip(&internal.children[1..]).enumerate() {
                    let at = CHILD_PTR_SIZE + i * stride;
                    body[at..at + k].copy_from_slice(key);
                    put_u32(body, at + k, child.0);
                }
            }
        }

        page.update_checksum();
        Ok(page)
    }

    /// Decode and validate a node page.
    pub fn decode(page: &Page, page_id: PageId, geometry: &Geometry) -> Result<Node> {
        let header = page.checked_header(page_id, &[PageType::BTreeLeaf, PageType::BTreeInternal])?;
        let count = header.count as usize;
        let k = geometry.key_bytes;
        let body = page.body();

        match header.page_type {
            PageType::BTreeLeaf => {
                if count > geometry.leaf_capacity() {
                    return Err(Error::corrupt(page_id, format!("leaf count {} too large", count)));
                }
                let stride = k + geometry.data_bytes;
                let mut leaf = LeafNode {
                    keys: Vec::with_capacity(count + 1),
                    values: Vec::with_capacity(count + 1),
                };
                for i in 0..count {
                    let at = i * stride;
                    leaf.keys.push(body[at..at + k].to_vec());
                    leaf.values.push(body[at + k..at + stride].to_vec());
                }
                Ok(Node::Leaf(leaf))
            }
            _ => {
                if count > geometry.internal_capacity() {
                    return Err(Error::corrupt(
                        page_id,
                        format!("internal count {} too large", count),
                    ));
                }
                let stride = k + CHILD_PTR_SIZE;
                let mut internal = InternalNode {
                    keys: Vec::with_capacity(count + 1),
                    children: Vec::with_capacity(count + 2),
                };
                internal.children.push(PageId(get_u32(body, 0)));
                for i in 0..count {
                    let at = CHILD_PTR_SIZE + i * stride;
                    internal.keys.push(body[at..at + k].to_vec());
                    internal.children.push(PageId(get_u32(body, at + k)));
                }
                if let Some(bad) = internal
                    .children
                    .iter()
                    .find(|child| !child.is_valid() || **child == HEADER_PAGE_ID)
                {
                    return Err(Error::corrupt(page_id, format!("bad child pointer {}", bad)));
                }
                Ok(Node::Internal(internal))
            }
        }
    }
}
