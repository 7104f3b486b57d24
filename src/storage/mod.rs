//! Storage layer - raw page I/O and on-disk formats.
//!
//! This module handles persistent storage:
//! - [`PageManager`] - Logical page I/O over RAM or a file
//! - [`FileHeader`] - The schema and root pointers in page 0
//! - [`page`] - Page types and layouts

mod file_header;
mod page_manager;
pub mod page;

pub use file_header::FileHeader;
pub(crate) use file_header::{get_u32, put_u32};
pub use page_manager::PageManager;
