//! Index structures.
//!
//! - [`btree`] - page-oriented B+Tree over fixed-length keys

pub mod btree;

pub use btree::{BPlusTree, IntegrityReport};
