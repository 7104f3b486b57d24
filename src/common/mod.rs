//! Common types and utilities shared across plustree.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and the geometry/options structs
//! - Error types
//! - Page identifiers

pub mod config;
pub mod error;
mod page_id;

pub use config::{Geometry, Options};
pub use error::{Error, Result};
pub use page_id::PageId;
